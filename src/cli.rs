use std::path::PathBuf;

use clap::builder::styling::{AnsiColor, Effects, Styles};
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

fn cli_styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::BrightCyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::BrightYellow.on_default() | Effects::BOLD)
        .literal(AnsiColor::BrightGreen.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::BrightMagenta.on_default())
}

pub fn styled_command() -> clap::Command {
    Cli::command()
}

#[derive(Debug, Parser)]
#[command(name = "sticket")]
#[command(bin_name = "sticket")]
#[command(version)]
#[command(about = "Helpdesk ticket tracking with history, notifications and volume escalation")]
#[command(styles = cli_styles())]
pub struct Cli {
    #[arg(
        short = 'd',
        long,
        env = "STICKET_DB_PATH",
        default_value = ".sticket/state.sqlite",
        help = "Path to the SQLite ticket store."
    )]
    pub db: String,

    #[arg(
        short = 'c',
        long,
        env = "STICKET_CONFIG",
        default_value = "sticket.toml",
        help = "Path to the TOML configuration (roles, teams, directories)."
    )]
    pub config: PathBuf,

    #[arg(
        short = 'u',
        long,
        env = "STICKET_USER",
        default_value = "",
        help = "Identity (email) of the acting user."
    )]
    pub user: String,

    #[arg(long, global = true, help = "Print the outcome as JSON.")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    #[command(about = "Submit a new ticket.")]
    New(NewArgs),
    #[command(about = "Change status, observations, priority or assignee.")]
    Update(UpdateArgs),
    #[command(about = "Claim an unassigned ticket.")]
    Take(TicketIdArgs),
    #[command(about = "List tickets with filters and pagination.")]
    Ls(ListArgs),
    #[command(about = "Show one ticket with its reference mapping.")]
    Show(TicketIdArgs),
    #[command(about = "Show the change history of a ticket.")]
    History(TicketIdArgs),
    #[command(about = "Add a comment to a ticket.")]
    Comment(CommentArgs),
    #[command(about = "List the comments of a ticket.")]
    Comments(TicketIdArgs),
    #[command(about = "List your unread notifications.")]
    Notifications,
    #[command(about = "Mark one of your notifications as read.")]
    Read(ReadArgs),
    #[command(about = "Bump overloaded sheets to Urgente priority.")]
    Escalate,
    #[command(about = "Manage motive reference data.")]
    Ref(RefArgs),
    #[command(about = "Export tickets to a JSON file.")]
    Export(ExportArgs),
    #[command(about = "Ask the assistant a question about tickets.")]
    Ask(AskArgs),
    #[command(about = "Show the acting identity, role and team lead.")]
    Whoami,
    #[command(about = "Print shell completions.")]
    Completions(CompletionsArgs),
}

#[derive(Debug, Args)]
pub struct NewArgs {
    #[arg(long = "client", help = "Client user the ticket is about.")]
    pub client_user: String,
    #[arg(long = "case", help = "External case number.")]
    pub case_number: String,
    #[arg(long)]
    pub tool: String,
    #[arg(long = "sheet", help = "Target client sheet.")]
    pub target_sheet: String,
    #[arg(long, help = "Escalation motive.")]
    pub motive: String,
    #[arg(long = "derivation")]
    pub derivation_id: String,
    #[arg(long = "external")]
    pub external_ticket_number: Option<String>,
    #[arg(long, help = "File to attach.")]
    pub attach: Option<PathBuf>,
    #[arg(long, requires = "attach", help = "MIME type of the attachment.")]
    pub mime: Option<String>,
}

#[derive(Debug, Args)]
pub struct UpdateArgs {
    pub id: String,
    #[arg(long)]
    pub status: Option<String>,
    #[arg(long)]
    pub observations: Option<String>,
    #[arg(long, help = "Normal or Urgente.")]
    pub priority: Option<String>,
    #[arg(long)]
    pub assignee: Option<String>,
}

#[derive(Debug, Args)]
pub struct TicketIdArgs {
    pub id: String,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    #[arg(long, short = 'q', help = "Case-insensitive text match across all fields.")]
    pub search: Option<String>,
    #[arg(long)]
    pub status: Option<String>,
    #[arg(long)]
    pub tool: Option<String>,
    #[arg(long)]
    pub motive: Option<String>,
    #[arg(long)]
    pub created_by: Option<String>,
    #[arg(long)]
    pub priority: Option<String>,
    #[arg(long = "from", help = "Earliest creation day (YYYY-MM-DD), inclusive.")]
    pub start_date: Option<String>,
    #[arg(long, help = "Team lead whose roster created the tickets.")]
    pub team: Option<String>,
    #[arg(long = "to", help = "Latest creation day (YYYY-MM-DD), inclusive.")]
    pub end_date: Option<String>,
    #[arg(long, help = "Only tickets you created.")]
    pub mine: bool,
    #[arg(long, default_value_t = 1)]
    pub page: usize,
    #[arg(long)]
    pub page_size: Option<usize>,
}

#[derive(Debug, Args)]
pub struct CommentArgs {
    pub id: String,
    pub text: String,
}

#[derive(Debug, Args)]
pub struct ReadArgs {
    #[arg(help = "Notification id as listed by `notifications`.")]
    pub id: String,
}

#[derive(Debug, Args)]
pub struct RefArgs {
    #[command(subcommand)]
    pub command: RefSubcommands,
}

#[derive(Debug, Subcommand)]
pub enum RefSubcommands {
    #[command(about = "Create or replace the mapping for a motive.")]
    Set(RefSetArgs),
    #[command(about = "Look up the mapping for a motive.")]
    Show(RefShowArgs),
    #[command(about = "List known motives.")]
    Ls,
}

#[derive(Debug, Args)]
pub struct RefSetArgs {
    pub motive: String,
    #[arg(long = "sheet")]
    pub sheet_name: String,
    #[arg(long, default_value = "")]
    pub route: String,
}

#[derive(Debug, Args)]
pub struct RefShowArgs {
    pub motive: String,
}

#[derive(Debug, Args)]
pub struct ExportArgs {
    #[arg(long = "from")]
    pub start_date: Option<String>,
    #[arg(long = "to")]
    pub end_date: Option<String>,
    #[arg(long, value_delimiter = ',', help = "Columns to keep, comma separated.")]
    pub columns: Vec<String>,
}

#[derive(Debug, Args)]
pub struct AskArgs {
    #[arg(required = true, trailing_var_arg = true)]
    pub question: Vec<String>,
}

#[derive(Debug, Args)]
pub struct CompletionsArgs {
    #[arg(value_enum)]
    pub shell: Shell,
}

#[cfg(test)]
mod tests {
    use super::{Cli, Commands, RefSubcommands};
    use clap::Parser;

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "sticket",
            "--user",
            "ana@example.com",
            "take",
            "TK-123456",
            "--json",
        ])
        .expect("arguments should parse");
        assert!(cli.json);
        assert_eq!(cli.user, "ana@example.com");
        assert!(matches!(cli.command, Commands::Take(ref args) if args.id == "TK-123456"));
    }

    #[test]
    fn export_columns_split_on_commas() {
        let cli = Cli::try_parse_from(["sticket", "export", "--columns", "id,status"])
            .expect("arguments should parse");
        match cli.command {
            Commands::Export(args) => assert_eq!(args.columns, vec!["id", "status"]),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn ref_set_takes_sheet_and_route() {
        let cli = Cli::try_parse_from([
            "sticket",
            "ref",
            "set",
            "Acceso bloqueado",
            "--sheet",
            "Accesos",
            "--route",
            "/accesos",
        ])
        .expect("arguments should parse");
        match cli.command {
            Commands::Ref(args) => match args.command {
                RefSubcommands::Set(set) => {
                    assert_eq!(set.motive, "Acceso bloqueado");
                    assert_eq!(set.sheet_name, "Accesos");
                    assert_eq!(set.route, "/accesos");
                }
                other => panic!("unexpected ref command: {other:?}"),
            },
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn mime_requires_an_attachment() {
        let result = Cli::try_parse_from([
            "sticket", "new", "--client", "U", "--case", "C", "--tool", "T", "--sheet", "S",
            "--motive", "M", "--derivation", "D", "--mime", "text/plain",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn command_definition_is_consistent() {
        super::styled_command().debug_assert();
    }
}
