//! Command-line splitting.

use crate::error::ConfigError;

/// Splits `raw` into an executable and its arguments.
///
/// Whitespace separates arguments; there is no shell quoting.
pub fn parse_args(owner: &str, raw: &str) -> Result<(String, Vec<String>), ConfigError> {
    split_argv(owner, raw.split_whitespace().map(str::to_string).collect())
}

/// Validates a pre-split argument vector.
pub fn split_argv(owner: &str, argv: Vec<String>) -> Result<(String, Vec<String>), ConfigError> {
    let mut iter = argv.into_iter().filter(|a| !a.is_empty());
    let exec = iter.next().ok_or_else(|| ConfigError::EmptyCommand {
        name: owner.to_string(),
    })?;
    Ok((exec, iter.collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_string() {
        let (exec, args) = parse_args("app", "  /bin/app -c  /etc/app.conf ").unwrap();
        assert_eq!(exec, "/bin/app");
        assert_eq!(args, vec!["-c", "/etc/app.conf"]);

        let (exec, args) = parse_args("app", "true").unwrap();
        assert_eq!(exec, "true");
        assert!(args.is_empty());
    }

    #[test]
    fn test_empty_is_rejected() {
        assert_eq!(
            parse_args("app", "   "),
            Err(ConfigError::EmptyCommand { name: "app".into() })
        );
        assert!(split_argv("app", vec![String::new()]).is_err());
    }
}
