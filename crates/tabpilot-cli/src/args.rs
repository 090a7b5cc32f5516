//! CLI argument parsing with clap derive macros.

use clap::{Parser, Subcommand};
use tabpilot_core::selector::ElementSelector;

/// Browser-tab automation for AI agents.
///
/// A page host owns one tab; the daemon relays commands to it. Snapshots list
/// the elements an agent can act on, each with a ref (`e1`, `e2`, …) that
/// stays valid for the rest of the session.
#[derive(Debug, Parser)]
#[command(name = "tabpilot", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List the page's interactive and landmark elements
    #[command(after_help = "\
Examples:
  tabpilot snapshot                          # Full snapshot as JSON
  tabpilot snapshot | jq '.elements[] | select(.role == \"button\")'")]
    Snapshot,

    /// Load a URL in the tab
    #[command(after_help = "\
Supported URLs: about:blank, data:text/html,<html>, file:///path/to/page.html

Examples:
  tabpilot navigate about:blank
  tabpilot navigate file:///tmp/form.html
  tabpilot navigate 'data:text/html,<button>OK</button>'")]
    Navigate(NavigateArgs),

    /// Click an element
    #[command(after_help = "\
Examples:
  tabpilot click --ref e3                      # By ref from the last snapshot
  tabpilot click --role button --name Submit   # By role and accessible name
  tabpilot click --css 'form > button'         # By CSS-like pattern
  tabpilot click --ref e3 --snapshot           # Include a fresh snapshot")]
    Click(ActionArgs),

    /// Type text into a textbox
    #[command(
        name = "type",
        after_help = "\
Examples:
  tabpilot type --role textbox --name Email 'ada@example.com'
  tabpilot type --ref e2 'hello'"
    )]
    Type(TypeArgs),

    /// Move the pointer over an element
    Hover(ActionArgs),

    /// Choose an option of a select element by value or label
    #[command(after_help = "\
Examples:
  tabpilot select --role combobox --name Country no
  tabpilot select --ref e5 'Norway'")]
    Select(SelectArgs),

    /// Press a key, key combination, or key sequence
    #[command(after_long_help = "\
Supported Keys:
  Editing:     Enter, Tab, Escape, Backspace, Delete, Insert, Space
  Arrows:      Up, Down, Left, Right, Home, End, PageUp, PageDown
  Function:    F1 .. F12
  Modifiers:   Ctrl+<key>, Alt+<key>, Shift+<key>, Meta+<key>

Key Sequences:
  Space-separated keys are pressed in order.

Examples:
  tabpilot press Enter                         # Press on the focused element
  tabpilot press --ref e2 Tab                  # Focus e2 first
  tabpilot press \"Ctrl+A Backspace\"            # Two presses")]
    Press(PressArgs),

    /// Show the tab's console log
    Console,

    /// Show an end-to-end usage example
    Examples,

    /// Serve a tab to the daemon (usually run once per session)
    Host(HostArgs),

    /// Start the daemon process (usually auto-started)
    Daemon(DaemonArgs),

    /// Stop the daemon process
    Stop,
}

/// Which element an action targets. At most one of `--ref`, `--css` and
/// `--role` may be given.
#[derive(Debug, Clone, Default, clap::Args)]
pub struct TargetArgs {
    /// Element ref from a snapshot (e.g. e3)
    #[arg(long = "ref", value_name = "REF", conflicts_with_all = ["css", "role"])]
    pub reference: Option<String>,

    /// CSS-like pattern matching exactly one element
    #[arg(long, value_name = "PATTERN", conflicts_with = "role")]
    pub css: Option<String>,

    /// ARIA role (e.g. button, textbox, link)
    #[arg(long)]
    pub role: Option<String>,

    /// Accessible name, used with --role
    #[arg(long, requires = "role")]
    pub name: Option<String>,
}

impl TargetArgs {
    pub fn selector(&self) -> Option<ElementSelector> {
        if let Some(reference) = &self.reference {
            return Some(ElementSelector::ByRef(reference.clone()));
        }
        if let Some(pattern) = &self.css {
            return Some(ElementSelector::ByPattern(pattern.clone()));
        }
        self.role.as_ref().map(|role| ElementSelector::ByRole {
            role: role.clone(),
            name: self.name.clone(),
        })
    }
}

#[derive(Debug, clap::Args)]
pub struct NavigateArgs {
    /// URL to load
    pub url: String,
}

#[derive(Debug, clap::Args)]
pub struct ActionArgs {
    #[command(flatten)]
    pub target: TargetArgs,

    /// Include a snapshot taken after the action settles
    #[arg(long)]
    pub snapshot: bool,
}

#[derive(Debug, clap::Args)]
pub struct TypeArgs {
    /// Text to type
    pub text: String,

    #[command(flatten)]
    pub target: TargetArgs,

    #[arg(long)]
    pub snapshot: bool,
}

#[derive(Debug, clap::Args)]
pub struct SelectArgs {
    /// Option value or visible label
    pub value: String,

    #[command(flatten)]
    pub target: TargetArgs,

    #[arg(long)]
    pub snapshot: bool,
}

#[derive(Debug, clap::Args)]
pub struct PressArgs {
    /// Key, combo, or sequence (e.g. Enter, Ctrl+A, "Tab Tab Enter")
    pub key: String,

    /// Element to focus first; otherwise the focused element receives the keys
    #[command(flatten)]
    pub target: TargetArgs,

    #[arg(long)]
    pub snapshot: bool,
}

#[derive(Debug, clap::Args)]
pub struct HostArgs {
    /// Page to open before serving
    #[arg(long)]
    pub url: Option<String>,
}

#[derive(Debug, clap::Args)]
pub struct DaemonArgs {
    /// Per-call timeout in milliseconds for requests relayed to the page host
    #[arg(long, default_value_t = 30000, value_name = "MS")]
    pub timeout: u64,
}

/// End-to-end example text for the `examples` command.
pub const EXAMPLES_TEXT: &str = r#"End-to-end example: Fill in a form

# 1. Start a page host on a local page (auto-starts the daemon)
tabpilot host --url file:///tmp/signup.html &

# 2. See what can be acted on
tabpilot snapshot

# 3. Fill in the email field by role and name
tabpilot type --role textbox --name Email "ada@example.com"

# 4. Tick the terms checkbox using its ref from the snapshot
tabpilot click --ref e3

# 5. Submit and look at the result in one go
tabpilot click --role button --name "Sign up" --snapshot

# 6. Check for warnings or navigation errors
tabpilot console

# 7. Stop the daemon (the host exits with it)
tabpilot stop
"#;

#[cfg(test)]
mod tests {
    use super::{Cli, Commands};
    use clap::Parser;
    use tabpilot_core::selector::ElementSelector;

    #[test]
    fn test_role_and_name_target() {
        let cli = Cli::parse_from([
            "tabpilot", "click", "--role", "button", "--name", "Sign up", "--snapshot",
        ]);

        match cli.command {
            Commands::Click(args) => {
                assert!(args.snapshot);
                assert_eq!(
                    args.target.selector(),
                    Some(ElementSelector::ByRole {
                        role: "button".into(),
                        name: Some("Sign up".into()),
                    })
                );
            }
            _ => panic!("Expected click command"),
        }
    }

    #[test]
    fn test_type_takes_text_and_ref() {
        let cli = Cli::parse_from(["tabpilot", "type", "--ref", "e2", "hello"]);
        match cli.command {
            Commands::Type(args) => {
                assert_eq!(args.text, "hello");
                assert_eq!(
                    args.target.selector(),
                    Some(ElementSelector::ByRef("e2".into()))
                );
            }
            _ => panic!("Expected type command"),
        }
    }

    #[test]
    fn test_press_without_target() {
        let cli = Cli::parse_from(["tabpilot", "press", "Ctrl+A Backspace"]);
        match cli.command {
            Commands::Press(args) => {
                assert_eq!(args.key, "Ctrl+A Backspace");
                assert_eq!(args.target.selector(), None);
            }
            _ => panic!("Expected press command"),
        }
    }

    #[test]
    fn test_targets_are_mutually_exclusive() {
        assert!(Cli::try_parse_from(["tabpilot", "click", "--ref", "e1", "--css", "a"]).is_err());
        assert!(
            Cli::try_parse_from(["tabpilot", "hover", "--css", "a", "--role", "link"]).is_err()
        );
        assert!(Cli::try_parse_from(["tabpilot", "click", "--name", "OK"]).is_err());
    }

    #[test]
    fn test_daemon_timeout_default() {
        let cli = Cli::parse_from(["tabpilot", "daemon"]);
        match cli.command {
            Commands::Daemon(args) => assert_eq!(args.timeout, 30000),
            _ => panic!("Expected daemon command"),
        }
    }
}
