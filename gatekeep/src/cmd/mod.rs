pub mod check;
pub mod score;
pub mod validate;
