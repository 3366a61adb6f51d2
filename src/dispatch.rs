use std::path::Path;

use crate::app::{App, AppError, TakeOutcome, TicketUpdate};
use crate::attachments::guess_mime_type;
use crate::cli::{Cli, Commands, ListArgs, NewArgs, RefSubcommands};
use crate::config::Config;
use crate::domain::ticket::{Attachment, TicketSubmission};
use crate::export::ExportRequest;
use crate::listing::DashboardQuery;
use crate::outcome::Outcome;
use crate::ui;

/// Runs one parsed command against the store and describes what happened.
pub fn run(cli: Cli) -> Result<Outcome, AppError> {
    if matches!(cli.command, Commands::Completions(_)) {
        return Err(completions_need_no_store());
    }
    let base = cli
        .config
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
        .to_path_buf();
    let config = Config::load(&cli.config)?.resolve_dirs(&base);
    let app = App::open(&cli.db, config)?;

    // Escalation runs as the system actor, so no identity is required.
    if matches!(cli.command, Commands::Escalate) {
        return escalate(&app);
    }

    let actor = app.principal(&cli.user)?;
    match cli.command {
        Commands::New(args) => {
            let submission = submission_from_args(args)?;
            let ticket = app.create_ticket(submission, &actor)?;
            Outcome::success(format!("created ticket {}", ticket.id))
                .line(ui::ticket_row(&ticket))
                .with("ticket_id", &ticket.id)?
                .with("ticket", &ticket)
        }
        Commands::Update(args) => {
            let update = TicketUpdate {
                status: args.status,
                observations: args.observations,
                priority: args.priority,
                assignee: args.assignee,
            };
            let outcome = app.update_ticket(&args.id, &actor, update)?;
            let result = if outcome.changed.is_empty() {
                Outcome::info(format!("no changes for ticket {}", outcome.ticket_id))
            } else {
                Outcome::success(format!(
                    "updated {} field(s) on ticket {}",
                    outcome.changed.len(),
                    outcome.ticket_id
                ))
            };
            result
                .lines(outcome.changed.iter().map(|change| {
                    format!("  {:?}: '{}' -> '{}'", change.field, change.from, change.to)
                }))
                .with("changed_fields", &outcome.changed)
        }
        Commands::Take(args) => match app.take_ticket(&args.id, &actor)? {
            TakeOutcome::Taken { assignee } => {
                Outcome::success(format!("ticket {} taken by {assignee}", args.id.trim()))
                    .with("assignee", &assignee)
            }
            TakeOutcome::AlreadyYours => Outcome::info(format!(
                "ticket {} is already assigned to you",
                args.id.trim()
            ))
            .with("assignee", &actor.short_name()),
            TakeOutcome::AlreadyTaken { by } => {
                Outcome::info(format!("ticket {} is already taken by {by}", args.id.trim()))
                    .with("assignee", &by)
            }
        },
        Commands::Ls(args) => {
            let query = query_from_args(args);
            let page = app.list_tickets(&query, &actor)?;
            Outcome::success(format!("{} ticket(s) matched", page.total_tickets))
                .lines(ui::dashboard_lines(&page, &query))
                .with("tickets", &page.tickets)?
                .with("total_tickets", &page.total_tickets)?
                .with("page", &page.page)?
                .with("page_size", &page.page_size)?
                .with("all_tickets_for_stats", &page.all_tickets_for_stats)?
                .with("facets", &page.facets)
        }
        Commands::Show(args) => {
            let detail = app.show_ticket(&args.id)?;
            let mut outcome =
                Outcome::success(format!("ticket {}", detail.ticket.id))
                    .lines(ui::ticket_detail(&detail.ticket));
            if let Some(reference) = detail.reference.as_ref() {
                outcome = outcome.line(format!(
                    "  reference: {} ({})",
                    reference.sheet_name, reference.route
                ));
            }
            outcome
                .with("ticket", &detail.ticket)?
                .with("reference", &detail.reference)
        }
        Commands::History(args) => {
            let entries = app.get_history(&args.id)?;
            Outcome::success(format!("{} history entr(ies)", entries.len()))
                .lines(ui::history_lines(&entries))
                .with("history", &entries)
        }
        Commands::Comment(args) => {
            let comment = app.add_comment(&args.id, &actor, &args.text)?;
            Outcome::success(format!("comment added to ticket {}", comment.ticket_id))
                .with("comment", &comment)
        }
        Commands::Comments(args) => {
            let comments = app.list_comments(&args.id)?;
            Outcome::success(format!("{} comment(s)", comments.len()))
                .lines(ui::comment_lines(&comments))
                .with("comments", &comments)
        }
        Commands::Notifications => {
            let notifications = app.list_unread_notifications(&actor)?;
            let outcome = if notifications.is_empty() {
                Outcome::info("no unread notifications")
            } else {
                Outcome::success(format!("{} unread notification(s)", notifications.len()))
            };
            outcome
                .lines(ui::notification_lines(&notifications))
                .with("notifications", &notifications)
        }
        Commands::Read(args) => {
            let notification = app.mark_notification_read(&args.id, &actor)?;
            Outcome::success(format!("notification {} marked as read", notification.id))
                .with("notification", &notification)
        }
        Commands::Ref(args) => match args.command {
            RefSubcommands::Set(set) => {
                let mapping =
                    app.set_reference(&actor, &set.motive, &set.sheet_name, &set.route)?;
                Outcome::success(format!("reference saved for '{}'", mapping.motive))
                    .with("reference", &mapping)
            }
            RefSubcommands::Show(show) => match app.lookup_reference(&show.motive)? {
                Some(mapping) => Outcome::success(format!(
                    "{} -> {} ({})",
                    mapping.motive, mapping.sheet_name, mapping.route
                ))
                .with("reference", &mapping),
                None => Ok(Outcome::info(format!(
                    "no reference for '{}'",
                    show.motive.trim()
                ))),
            },
            RefSubcommands::Ls => {
                let motives = app.list_motives()?;
                Outcome::success(format!("{} motive(s)", motives.len()))
                    .lines(motives.iter().map(|motive| format!("  {motive}")))
                    .with("motives", &motives)
            }
        },
        Commands::Export(args) => {
            let request = ExportRequest {
                start_date: args.start_date,
                end_date: args.end_date,
                columns: args.columns,
            };
            let summary = app.export_tickets(&actor, &request)?;
            Outcome::success(format!(
                "exported {} ticket(s) to {}",
                summary.rows,
                summary.path.display()
            ))
            .with("export", &summary)
        }
        Commands::Ask(args) => {
            let generator = app.configured_generator()?;
            let answer = app.ask(&args.question.join(" "), &generator)?;
            Outcome::success(answer.clone()).with("answer", &answer)
        }
        Commands::Whoami => {
            let profile = app.whoami(&actor);
            Outcome::success(format!("{} ({})", profile.identity, profile.role.as_str()))
                .lines(
                    profile
                        .team_lead
                        .iter()
                        .map(|lead| format!("  team lead: {lead}")),
                )
                .with("profile", &profile)
        }
        Commands::Escalate => escalate(&app),
        Commands::Completions(_) => Err(completions_need_no_store()),
    }
}

fn escalate(app: &App) -> Result<Outcome, AppError> {
    let summary = app.run_volume_escalation()?;
    let outcome = if summary.escalated.is_empty() {
        Outcome::info("no tickets needed escalation")
    } else {
        Outcome::success(format!(
            "escalated {} ticket(s) across {} sheet(s)",
            summary.escalated.len(),
            summary.overloaded_sheets.len()
        ))
    };
    outcome
        .lines(summary.escalated.iter().map(|id| format!("  {id} -> Urgente")))
        .with("summary", &summary)
}

fn completions_need_no_store() -> AppError {
    AppError::Validation("completions are printed directly, not dispatched".to_string())
}

fn submission_from_args(args: NewArgs) -> Result<TicketSubmission, AppError> {
    let attachment = match args.attach {
        Some(path) => {
            let bytes = std::fs::read(&path)?;
            let filename = path
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or("attachment")
                .to_string();
            let mime_type = args
                .mime
                .unwrap_or_else(|| guess_mime_type(&filename).to_string());
            Some(Attachment {
                bytes,
                mime_type,
                filename,
            })
        }
        None => None,
    };
    Ok(TicketSubmission {
        client_user: args.client_user,
        case_number: args.case_number,
        tool: args.tool,
        target_sheet: args.target_sheet,
        motive: args.motive,
        derivation_id: args.derivation_id,
        external_ticket_number: args.external_ticket_number,
        attachment,
    })
}

fn query_from_args(args: ListArgs) -> DashboardQuery {
    DashboardQuery {
        search: args.search,
        status: args.status,
        tool: args.tool,
        motive: args.motive,
        created_by: args.created_by,
        priority: args.priority,
        start_date: args.start_date,
        team: args.team,
        end_date: args.end_date,
        mine_only: args.mine,
        page: args.page,
        page_size: args.page_size,
    }
}
