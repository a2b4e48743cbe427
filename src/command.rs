//! Command classification.
//!
//! Every incoming command line is parsed into a closed tagged enum before
//! dispatch, so the executor is a match over four variants instead of a
//! chain of prefix checks. Precedence is fixed: git, then install, then
//! dev-server, then generic.

/// Classification of a raw command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandKind {
    /// `git <subcommand> [args...]`
    Git {
        subcommand: String,
        args: Vec<String>,
    },
    /// A dependency install (`npm install`, `npm ci`, `yarn`, `pnpm install`).
    Install,
    /// A long-running dev server (`npm run dev`, `npm start`, `yarn dev`).
    DevServer,
    /// Anything else; executed verbatim through the shell.
    Generic,
}

/// Split a command line into tokens, honoring single and double quotes so
/// a commit message like `-m "add feature"` stays one argument. Anything
/// fancier (escapes, expansion) is left to the shell, which is what
/// ultimately runs the command.
fn tokenize(raw: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    for c in raw.chars() {
        match quote {
            Some(q) => {
                if c == q {
                    quote = None;
                } else {
                    current.push(c);
                }
            }
            None => match c {
                '\'' | '"' => quote = Some(c),
                c if c.is_whitespace() => {
                    if !current.is_empty() {
                        tokens.push(std::mem::take(&mut current));
                    }
                }
                _ => current.push(c),
            },
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Parse a raw command line into its classification.
pub fn classify(raw: &str) -> CommandKind {
    let tokens = tokenize(raw);
    let Some(first) = tokens.first().map(|s| s.as_str()) else {
        return CommandKind::Generic;
    };

    if first == "git" {
        let subcommand = tokens.get(1).cloned().unwrap_or_default();
        let args = tokens.iter().skip(2).cloned().collect();
        return CommandKind::Git { subcommand, args };
    }

    let second = tokens.get(1).map(|s| s.as_str());
    match (first, second) {
        ("npm", Some("install")) | ("npm", Some("ci")) => CommandKind::Install,
        ("yarn", None) | ("yarn", Some("install")) | ("pnpm", Some("install")) => {
            CommandKind::Install
        }
        ("npm", Some("start")) => CommandKind::DevServer,
        ("npm", Some("run")) if tokens.get(2).map(|s| s.as_str()) == Some("dev") => {
            CommandKind::DevServer
        }
        ("yarn", Some("dev")) | ("pnpm", Some("dev")) => CommandKind::DevServer,
        _ => CommandKind::Generic,
    }
}

/// Extract the commit message from `git commit` arguments.
///
/// Understands `-m msg`, `--message msg` and `--message=msg`. Falls back
/// to `"Update files"` when no message can be recovered, so a commit
/// issued through the API never fails for want of a message.
pub fn commit_message(args: &[String]) -> String {
    let mut iter = args.iter().peekable();
    while let Some(arg) = iter.next() {
        if arg == "-m" || arg == "--message" {
            if let Some(msg) = iter.peek() {
                return trim_quotes(msg).to_string();
            }
        } else if let Some(msg) = arg.strip_prefix("--message=") {
            return trim_quotes(msg).to_string();
        }
    }
    "Update files".to_string()
}

fn trim_quotes(s: &str) -> &str {
    let s = s.trim();
    s.strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .or_else(|| {
            s.strip_prefix('\'')
                .and_then(|inner| inner.strip_suffix('\''))
        })
        .unwrap_or(s)
}
