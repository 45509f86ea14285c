//! Small free functions shared by the local runner, the container exec
//! readiness path and the seed manager's subprocess strategy.

/// Splits a shell-ish command line into tokens, respecting single and double
/// quotes so a value like `psql -c "select 1"` keeps its quoted argument
/// intact instead of being split on the inner space.
pub fn split_command(command: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut chars = command.chars().peekable();

    while let Some(c) = chars.next() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None => match c {
                '\'' | '"' => quote = Some(c),
                c if c.is_whitespace() => {
                    if !current.is_empty() {
                        tokens.push(std::mem::take(&mut current));
                    }
                }
                c => current.push(c),
            },
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_whitespace() {
        assert_eq!(split_command("node server.js --port 3000"), vec!["node", "server.js", "--port", "3000"]);
    }

    #[test]
    fn keeps_quoted_segments_together() {
        assert_eq!(
            split_command(r#"psql -c "select 1""#),
            vec!["psql", "-c", "select 1"]
        );
    }

    #[test]
    fn collapses_repeated_whitespace() {
        assert_eq!(split_command("  ls   -la  "), vec!["ls", "-la"]);
    }
}
