//! `score`: compile a matcher and show how specific it is.

use anyhow::{Context, Result};
use gatekeep_policy::{Expr, compile, compile_list};
use tracing::{Level, instrument};

#[instrument(level = Level::TRACE)]
pub fn run(matchers: &[String]) -> Result<()> {
    let expr = compile_matchers(matchers)?;
    println!("{expr}");
    println!("specificity = {:.2}", expr.specificity());
    Ok(())
}

fn compile_matchers(matchers: &[String]) -> Result<Expr> {
    match matchers {
        [single] => compile(single).with_context(|| format!("invalid matcher '{single}'")),
        many => compile_list(many).context("invalid list matcher"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_matcher() {
        let expr = compile_matchers(&[".role   IS admin".to_string()]).unwrap();
        assert_eq!(expr.to_string(), ".role IS admin");
        assert_eq!(expr.specificity(), 1.0);
    }

    #[test]
    fn several_matchers_form_a_list() {
        let expr = compile_matchers(&["*".to_string(), "admin".to_string()]).unwrap();
        assert_eq!(expr.to_string(), "* OR admin");
        assert_eq!(expr.specificity(), 0.0);
    }

    #[test]
    fn syntax_error_is_reported() {
        let err = compile_matchers(&["admin AND".to_string()]).unwrap_err();
        assert!(format!("{err:#}").contains("{!}"));
    }
}
