//! Environment variable interpolation for config files.
//!
//! Supported forms:
//! - `$VAR` / `${VAR}`: value of VAR, error if unset
//! - `${VAR:-default}`: default when VAR is unset or empty
//! - `${VAR-default}`: default only when VAR is unset
//! - `$$`: a literal `$`

use regex::{Captures, Regex};
use std::env;
use std::sync::LazyLock;

static VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        \$\$
        |
        \$\{ ([A-Za-z_][A-Za-z0-9_]*) (?: (:?-) ([^}]*) )? \}
        |
        \$([A-Za-z_][A-Za-z0-9_]*)
        ",
    )
    .expect("static regex is valid")
});

/// Substitute environment variables in `input`.
///
/// On failure every problem is reported at once, so a config with several
/// missing variables can be fixed in one go.
pub fn interpolate(input: &str) -> Result<String, Vec<String>> {
    let mut errors = Vec::new();

    let text = VAR_PATTERN.replace_all(input, |caps: &Captures| match resolve(caps) {
        Ok(value) => value,
        Err(message) => {
            errors.push(message);
            caps[0].to_string()
        }
    });

    if errors.is_empty() {
        Ok(text.into_owned())
    } else {
        Err(errors)
    }
}

fn resolve(caps: &Captures) -> Result<String, String> {
    if &caps[0] == "$$" {
        return Ok("$".to_string());
    }

    let name = caps
        .get(1)
        .or_else(|| caps.get(4))
        .map(|m| m.as_str())
        .unwrap_or_default();
    let operator = caps.get(2).map(|m| m.as_str());
    let default = caps.get(3).map(|m| m.as_str());

    match (env::var(name), default) {
        (Ok(value), _) if value.contains(['\n', '\r']) => Err(format!(
            "environment variable '{name}' contains newlines, which is not allowed"
        )),
        (Ok(value), Some(default)) if value.is_empty() && operator == Some(":-") => {
            Ok(default.to_string())
        }
        (Ok(value), _) => Ok(value),
        (Err(_), Some(default)) => Ok(default.to_string()),
        (Err(_), None) => Err(format!("environment variable '{name}' is not set")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_env_vars<F, R>(vars: &[(&str, Option<&str>)], f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let originals: Vec<_> = vars.iter().map(|(k, _)| (*k, env::var(k).ok())).collect();

        // SAFETY: every test uses its own variable names
        for (key, value) in vars {
            match value {
                Some(v) => unsafe { env::set_var(key, v) },
                None => unsafe { env::remove_var(key) },
            }
        }

        let result = f();

        // SAFETY: restoring the values saved above
        for (key, original) in originals {
            match original {
                Some(v) => unsafe { env::set_var(key, v) },
                None => unsafe { env::remove_var(key) },
            }
        }

        result
    }

    #[test]
    fn test_braced_and_bare() {
        with_env_vars(&[("MEMC_LOAD_TEST_HOST", Some("10.0.0.5"))], || {
            let text = interpolate("idfa: ${MEMC_LOAD_TEST_HOST}:33013\ngaid: $MEMC_LOAD_TEST_HOST:33014")
                .unwrap();
            assert_eq!(text, "idfa: 10.0.0.5:33013\ngaid: 10.0.0.5:33014");
        });
    }

    #[test]
    fn test_missing_variables_all_reported() {
        with_env_vars(
            &[("MEMC_LOAD_TEST_MISS1", None), ("MEMC_LOAD_TEST_MISS2", None)],
            || {
                let errors = interpolate("a: $MEMC_LOAD_TEST_MISS1, b: ${MEMC_LOAD_TEST_MISS2}")
                    .unwrap_err();
                assert_eq!(errors.len(), 2);
                assert!(errors[0].contains("MEMC_LOAD_TEST_MISS1"));
                assert!(errors[1].contains("not set"));
            },
        );
    }

    #[test]
    fn test_defaults() {
        with_env_vars(
            &[
                ("MEMC_LOAD_TEST_UNSET", None),
                ("MEMC_LOAD_TEST_EMPTY", Some("")),
            ],
            || {
                assert_eq!(
                    interpolate("${MEMC_LOAD_TEST_UNSET:-4}").unwrap(),
                    "4"
                );
                assert_eq!(
                    interpolate("${MEMC_LOAD_TEST_UNSET-4}").unwrap(),
                    "4"
                );
                assert_eq!(
                    interpolate("${MEMC_LOAD_TEST_EMPTY:-4}").unwrap(),
                    "4"
                );
                assert_eq!(interpolate("${MEMC_LOAD_TEST_EMPTY-4}").unwrap(), "");
            },
        );
    }

    #[test]
    fn test_set_variable_beats_default() {
        with_env_vars(&[("MEMC_LOAD_TEST_SET", Some("best-effort"))], || {
            let text = interpolate("policy: ${MEMC_LOAD_TEST_SET:-abort-on-first-error}").unwrap();
            assert_eq!(text, "policy: best-effort");
        });
    }

    #[test]
    fn test_escape() {
        assert_eq!(interpolate("cost: $$5").unwrap(), "cost: $5");
    }

    #[test]
    fn test_newline_injection_blocked() {
        with_env_vars(&[("MEMC_LOAD_TEST_NL", Some("a\r\nb"))], || {
            let errors = interpolate("x: $MEMC_LOAD_TEST_NL").unwrap_err();
            assert!(errors[0].contains("newlines"));
        });
    }

    #[test]
    fn test_plain_text_untouched() {
        let text = "pattern: /data/appsinstalled/*.tsv.gz";
        assert_eq!(interpolate(text).unwrap(), text);
    }
}
