/// Command router
///
/// Turns prefixed chat messages into engine and store operations through
/// a static command table. Unknown commands stay silent; malformed
/// arguments get a single usage reply; every claim attempt produces
/// exactly one channel reply. Credentials are never posted to the
/// channel, only delivered privately.
use crate::activity::{ActivityLog, LogType};
use crate::allocation::{policy, AllocationEngine, PermissionLevel};
use crate::bot::settings::{BotSettings, SettingsManager, SettingsUpdate};
use crate::bot::transport::ChatTransport;
use crate::bot::ChatMessage;
use crate::config::ServerConfig;
use crate::error::{QmError, QmResult};
use crate::inventory::{AccountDraft, CategoryRef, InventoryManager};
use crate::metrics;
use std::sync::Arc;

/// A prefixed message split into command word, arguments, and the
/// remaining lines (used by bulk import)
#[derive(Debug, Clone, PartialEq, Eq)]
struct ParsedCommand {
    name: String,
    args: Vec<String>,
    body: String,
}

/// Required permission level per command; `None` means the word is not
/// a command at all
fn required_level(command: &str) -> Option<PermissionLevel> {
    match command {
        "help" | "stock" | "gen" => Some(PermissionLevel::User),
        "add" | "bulkadd" | "remove" | "restock" | "prefix" | "cooldown" => {
            Some(PermissionLevel::Admin)
        }
        _ => None,
    }
}

fn parse_command(content: &str, prefix: &str) -> Option<ParsedCommand> {
    let rest = content.trim_start().strip_prefix(prefix)?;
    let (first_line, body) = match rest.split_once('\n') {
        Some((first, body)) => (first, body),
        None => (rest, ""),
    };

    let mut tokens = first_line.split_whitespace();
    let name = tokens.next()?.to_lowercase();
    let args = tokens.map(str::to_string).collect();

    Some(ParsedCommand {
        name,
        args,
        body: body.to_string(),
    })
}

/// User-facing rendering of engine errors. Storage failures collapse to
/// a retry notice; the details stay in the logs.
fn render_error(error: &QmError, prefix: &str) -> String {
    match error {
        QmError::CategoryNotFound(name) => format!(
            "Unknown category '{}'. Use {}stock to see what's available.",
            name, prefix
        ),
        QmError::PermissionDenied(_) => "You don't have permission to do that here.".to_string(),
        QmError::CooldownActive { remaining_secs } => format!(
            "You're on cooldown - try again in {}.",
            format_remaining(*remaining_secs)
        ),
        QmError::StockExhausted(name) => format!("'{}' is out of stock right now.", name),
        QmError::BatchValidation { line, reason } => format!("Line {}: {}", line, reason),
        QmError::Validation(reason) => reason.clone(),
        QmError::NotFound(reason) => reason.clone(),
        QmError::Conflict(reason) => reason.clone(),
        _ => "Something went wrong. Try again later.".to_string(),
    }
}

fn format_remaining(secs: i64) -> String {
    let secs = secs.max(0);
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

pub struct CommandRouter {
    config: Arc<ServerConfig>,
    engine: AllocationEngine,
    inventory: InventoryManager,
    settings: SettingsManager,
    activity: ActivityLog,
    transport: Arc<dyn ChatTransport>,
}

impl CommandRouter {
    pub fn new(
        config: Arc<ServerConfig>,
        engine: AllocationEngine,
        inventory: InventoryManager,
        settings: SettingsManager,
        activity: ActivityLog,
        transport: Arc<dyn ChatTransport>,
    ) -> Self {
        Self {
            config,
            engine,
            inventory,
            settings,
            activity,
            transport,
        }
    }

    /// Route one inbound message. Returns `Err` only for transport or
    /// unrecoverable storage failures; everything the user can fix is
    /// answered with a reply instead.
    pub async fn handle_message(&self, message: &ChatMessage) -> QmResult<()> {
        let settings = match &message.guild_id {
            Some(guild_id) => match self.settings.get_or_create(guild_id).await {
                Ok(settings) => Some(settings),
                Err(e) => {
                    tracing::error!("Failed to load settings for guild {}: {}", guild_id, e);
                    // Still answer anything that parses as a real
                    // command under the default prefix
                    if let Some(cmd) =
                        parse_command(&message.content, &self.config.bot.default_prefix)
                    {
                        if required_level(&cmd.name).is_some() {
                            self.transport
                                .reply(&message.channel_id, "Something went wrong. Try again later.")
                                .await?;
                        }
                    }
                    return Err(e);
                }
            },
            None => None,
        };

        let prefix = settings
            .as_ref()
            .map(|s| s.prefix.clone())
            .unwrap_or_else(|| self.config.bot.default_prefix.clone());

        let Some(command) = parse_command(&message.content, &prefix) else {
            return Ok(());
        };

        let Some(level) = required_level(&command.name) else {
            tracing::debug!("Ignoring unknown command '{}'", command.name);
            return Ok(());
        };

        metrics::record_command(&command.name);

        let owner_ids = &self.config.authentication.owner_ids;
        match level {
            PermissionLevel::Admin => {
                if !policy::is_admin(&message.author, settings.as_ref(), owner_ids) {
                    let note = format!(
                        "{} tried {}{} without admin rights",
                        message.author.id, prefix, command.name
                    );
                    if let Err(log_err) = self
                        .activity
                        .append(LogType::Warning, "COMMAND_DENIED", &note, Some(&message.author.id))
                        .await
                    {
                        tracing::warn!("Failed to record command denial: {}", log_err);
                    }
                    self.transport
                        .reply(&message.channel_id, "That command is for administrators.")
                        .await?;
                    return Ok(());
                }
            }
            // `gen` is gated inside the engine so the attempt is logged
            PermissionLevel::User if command.name != "gen" => {
                if !policy::is_allowed(
                    &message.author,
                    settings.as_ref(),
                    PermissionLevel::User,
                    owner_ids,
                ) {
                    self.transport
                        .reply(
                            &message.channel_id,
                            "You don't have permission to use that command here.",
                        )
                        .await?;
                    return Ok(());
                }
            }
            PermissionLevel::User => {}
        }

        match command.name.as_str() {
            "help" => self.cmd_help(message, settings.as_ref(), &prefix).await,
            "stock" => self.cmd_stock(message, &prefix).await,
            "gen" => {
                self.cmd_gen(message, settings.as_ref(), &command.args, &prefix)
                    .await
            }
            "add" => self.cmd_add(message, &command.args, &prefix).await,
            "bulkadd" => self.cmd_bulkadd(message, &command, &prefix).await,
            "remove" => self.cmd_remove(message, &command.args, &prefix).await,
            "restock" => self.cmd_restock(message, &command.args, &prefix).await,
            "prefix" => self.cmd_prefix(message, &command.args, &prefix).await,
            "cooldown" => self.cmd_cooldown(message, &command.args, &prefix).await,
            _ => Ok(()),
        }
    }

    async fn cmd_help(
        &self,
        message: &ChatMessage,
        settings: Option<&BotSettings>,
        prefix: &str,
    ) -> QmResult<()> {
        let mut text = format!(
            "Available commands:\n\
             {p}help - show this message\n\
             {p}stock - list categories and availability\n\
             {p}gen <category> - claim an account (delivered privately)",
            p = prefix
        );

        if policy::is_admin(&message.author, settings, &self.config.authentication.owner_ids) {
            text.push_str(&format!(
                "\nAdmin commands:\n\
                 {p}add <category> <email:password>\n\
                 {p}bulkadd <category> - accounts on the following lines\n\
                 {p}remove <category> <email>\n\
                 {p}restock <account id>\n\
                 {p}prefix <new prefix>\n\
                 {p}cooldown <seconds>",
                p = prefix
            ));
        }

        self.transport.reply(&message.channel_id, &text).await
    }

    async fn cmd_stock(&self, message: &ChatMessage, prefix: &str) -> QmResult<()> {
        let text = match self.inventory.list_categories().await {
            Ok(categories) if categories.is_empty() => {
                "No categories have been stocked yet.".to_string()
            }
            Ok(categories) => {
                let mut lines = vec!["Current stock:".to_string()];
                for stock in &categories {
                    lines.push(format!(
                        "  {} - {} available",
                        stock.category.name, stock.available
                    ));
                }
                lines.join("\n")
            }
            Err(e) => render_error(&e, prefix),
        };

        self.transport.reply(&message.channel_id, &text).await
    }

    async fn cmd_gen(
        &self,
        message: &ChatMessage,
        settings: Option<&BotSettings>,
        args: &[String],
        prefix: &str,
    ) -> QmResult<()> {
        let Some(settings) = settings else {
            return self
                .transport
                .reply(&message.channel_id, "Account generation only works in a server.")
                .await;
        };

        let category = args.join(" ");
        if category.is_empty() {
            return self
                .transport
                .reply(&message.channel_id, &format!("Usage: {}gen <category>", prefix))
                .await;
        }

        let claim = self
            .engine
            .claim(
                &message.author,
                &CategoryRef::Name(category.clone()),
                Some(settings),
            )
            .await;

        let account = match claim {
            Ok(account) => account,
            Err(e) => {
                return self
                    .transport
                    .reply(&message.channel_id, &render_error(&e, prefix))
                    .await;
            }
        };

        let credentials = format!(
            "Your {} account:\nemail: {}\npassword: {}",
            category, account.email, account.password
        );

        match self
            .transport
            .send_private(&message.author.id, &credentials)
            .await
        {
            Ok(()) => {
                self.transport
                    .reply(
                        &message.channel_id,
                        "Account generated - check your private messages.",
                    )
                    .await
            }
            Err(delivery_err) => {
                tracing::warn!(
                    "Credential delivery to {} failed: {}",
                    message.author.id,
                    delivery_err
                );
                if let Err(release_err) = self.engine.release(account.id).await {
                    tracing::error!(
                        "Failed to release account {} after delivery failure: {}",
                        account.id,
                        release_err
                    );
                }
                self.transport
                    .reply(
                        &message.channel_id,
                        "I couldn't message you privately. Open your DMs and try again - the account went back to stock.",
                    )
                    .await
            }
        }
    }

    async fn cmd_add(&self, message: &ChatMessage, args: &[String], prefix: &str) -> QmResult<()> {
        if args.len() < 2 {
            return self
                .transport
                .reply(
                    &message.channel_id,
                    &format!("Usage: {}add <category> <email:password>", prefix),
                )
                .await;
        }

        let credential = &args[args.len() - 1];
        let category = args[..args.len() - 1].join(" ");

        let draft = match AccountDraft::parse_line(1, credential) {
            Ok(Some(draft)) => draft,
            Ok(None) => {
                return self
                    .transport
                    .reply(
                        &message.channel_id,
                        &format!("Usage: {}add <category> <email:password>", prefix),
                    )
                    .await;
            }
            Err(e) => {
                return self
                    .transport
                    .reply(&message.channel_id, &render_error(&e, prefix))
                    .await;
            }
        };

        let text = match self
            .engine
            .add_accounts(
                &CategoryRef::Name(category.clone()),
                vec![draft],
                None,
                &message.author.id,
            )
            .await
        {
            Ok(_) => format!("Added 1 account to '{}'.", category),
            Err(e) => render_error(&e, prefix),
        };

        self.transport.reply(&message.channel_id, &text).await
    }

    async fn cmd_bulkadd(
        &self,
        message: &ChatMessage,
        command: &ParsedCommand,
        prefix: &str,
    ) -> QmResult<()> {
        let category = command.args.join(" ");
        if category.is_empty() {
            return self
                .transport
                .reply(
                    &message.channel_id,
                    &format!(
                        "Usage: {}bulkadd <category>, then one email:password per line.",
                        prefix
                    ),
                )
                .await;
        }

        let drafts = match AccountDraft::parse_batch(&command.body) {
            Ok(drafts) if drafts.is_empty() => {
                return self
                    .transport
                    .reply(
                        &message.channel_id,
                        "Paste accounts after the command, one email:password per line.",
                    )
                    .await;
            }
            Ok(drafts) => drafts,
            Err(e) => {
                return self
                    .transport
                    .reply(&message.channel_id, &render_error(&e, prefix))
                    .await;
            }
        };

        let text = match self
            .engine
            .add_accounts(
                &CategoryRef::Name(category.clone()),
                drafts,
                None,
                &message.author.id,
            )
            .await
        {
            Ok(accounts) => format!("Added {} account(s) to '{}'.", accounts.len(), category),
            Err(e) => render_error(&e, prefix),
        };

        self.transport.reply(&message.channel_id, &text).await
    }

    async fn cmd_remove(
        &self,
        message: &ChatMessage,
        args: &[String],
        prefix: &str,
    ) -> QmResult<()> {
        if args.len() < 2 {
            return self
                .transport
                .reply(
                    &message.channel_id,
                    &format!("Usage: {}remove <category> <email>", prefix),
                )
                .await;
        }

        let email = &args[args.len() - 1];
        let category = args[..args.len() - 1].join(" ");

        let text = match self
            .engine
            .remove_account(&CategoryRef::Name(category.clone()), email, &message.author.id)
            .await
        {
            Ok(true) => format!("Removed {} from '{}'.", email, category),
            Ok(false) => format!("No account {} in '{}'.", email, category),
            Err(e) => render_error(&e, prefix),
        };

        self.transport.reply(&message.channel_id, &text).await
    }

    async fn cmd_restock(
        &self,
        message: &ChatMessage,
        args: &[String],
        prefix: &str,
    ) -> QmResult<()> {
        let id = match args {
            [raw] => raw.parse::<i64>().ok(),
            _ => None,
        };
        let Some(id) = id else {
            return self
                .transport
                .reply(
                    &message.channel_id,
                    &format!("Usage: {}restock <account id>", prefix),
                )
                .await;
        };

        let text = match self.engine.restock(id, &message.author.id).await {
            Ok(account) => format!("Restocked {} (#{}).", account.email, account.id),
            Err(QmError::NotFound(_)) => format!("No account with id {}.", id),
            Err(e) => render_error(&e, prefix),
        };

        self.transport.reply(&message.channel_id, &text).await
    }

    async fn cmd_prefix(
        &self,
        message: &ChatMessage,
        args: &[String],
        prefix: &str,
    ) -> QmResult<()> {
        let Some(guild_id) = &message.guild_id else {
            return self
                .transport
                .reply(&message.channel_id, "Prefix changes only work in a server.")
                .await;
        };

        if args.len() != 1 {
            return self
                .transport
                .reply(
                    &message.channel_id,
                    &format!("Usage: {}prefix <new prefix>", prefix),
                )
                .await;
        }

        let update = SettingsUpdate {
            prefix: Some(args[0].clone()),
            ..Default::default()
        };
        let text = match self.settings.update(guild_id, update, &message.author.id).await {
            Ok(updated) => format!("Prefix changed to {}", updated.prefix),
            Err(e) => render_error(&e, prefix),
        };

        self.transport.reply(&message.channel_id, &text).await
    }

    async fn cmd_cooldown(
        &self,
        message: &ChatMessage,
        args: &[String],
        prefix: &str,
    ) -> QmResult<()> {
        let Some(guild_id) = &message.guild_id else {
            return self
                .transport
                .reply(&message.channel_id, "Cooldown changes only work in a server.")
                .await;
        };

        let seconds = match args {
            [raw] => raw.parse::<i64>().ok(),
            _ => None,
        };
        let Some(seconds) = seconds else {
            return self
                .transport
                .reply(
                    &message.channel_id,
                    &format!("Usage: {}cooldown <seconds>", prefix),
                )
                .await;
        };

        let update = SettingsUpdate {
            cooldown_seconds: Some(seconds),
            ..Default::default()
        };
        let text = match self.settings.update(guild_id, update, &message.author.id).await {
            Ok(updated) => format!("Cooldown set to {}s.", updated.cooldown_seconds),
            Err(e) => render_error(&e, prefix),
        };

        self.transport.reply(&message.channel_id, &text).await
    }
}
