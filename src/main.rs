#[macro_use]
mod log;

mod config;
mod email;
mod jmap;
mod mailbox;
mod rules;
mod signal;
mod store;

use config::{AccountConfig, Config};
use email::EmailRecord;
use jmap::client::JmapClient;
use mailbox::{JmapMailbox, MailboxClient};
use rules::engine::RunReport;
use rules::executor::ActionStatus;
use rules::{RuleEngine, RuleSet, RuleSetError};
use std::path::{Path, PathBuf};
use std::process::Command;
use store::{EmailRepository, Store};

const USAGE: &str = "Usage: mailrules [OPTIONS]

Fetch mail over JMAP into a local store and apply filtering rules.
Without an action flag: fetch, store, then apply rules.

Options:
  -c N, --count=N   Number of emails to fetch (default from config, else 10)
  --refresh         Fetch emails and store them locally
  --apply-rules     Apply rules to the stored emails
  --mark-read       Mark the fetched emails as read
  --mark-unread     Mark the fetched emails as unread
  --display         Fetch and print emails without storing them
  --config=PATH     Use config file at PATH instead of default
  --rules=PATH      Use rules file at PATH instead of default
  --print-rules     Parse and print the rules file
  --log             View the log file in $PAGER
  --clear-log       Truncate the log file at startup
  --help            Show this help";

struct Options {
    count: Option<usize>,
    refresh: bool,
    apply_rules: bool,
    mark_read: bool,
    mark_unread: bool,
    display: bool,
    print_rules: bool,
    show_log: bool,
    clear_log: bool,
    help: bool,
    config_path: Option<PathBuf>,
    rules_path: Option<PathBuf>,
}

impl Options {
    fn parse(args: &[String]) -> Result<Self, String> {
        let mut opts = Options {
            count: None,
            refresh: false,
            apply_rules: false,
            mark_read: false,
            mark_unread: false,
            display: false,
            print_rules: false,
            show_log: false,
            clear_log: false,
            help: false,
            config_path: None,
            rules_path: None,
        };

        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--refresh" => opts.refresh = true,
                "--apply-rules" => opts.apply_rules = true,
                "--mark-read" => opts.mark_read = true,
                "--mark-unread" => opts.mark_unread = true,
                "--display" => opts.display = true,
                "--print-rules" => opts.print_rules = true,
                "--log" => opts.show_log = true,
                "--clear-log" => opts.clear_log = true,
                "--help" | "-h" => opts.help = true,
                "-c" | "--count" => {
                    let value = iter
                        .next()
                        .ok_or_else(|| format!("{} requires a number", arg))?;
                    opts.count = Some(parse_count(value)?);
                }
                _ => {
                    if let Some(value) = arg.strip_prefix("--count=") {
                        opts.count = Some(parse_count(value)?);
                    } else if let Some(path) = arg.strip_prefix("--config=") {
                        opts.config_path = Some(PathBuf::from(path));
                    } else if let Some(path) = arg.strip_prefix("--rules=") {
                        opts.rules_path = Some(PathBuf::from(path));
                    } else {
                        return Err(format!("unknown option '{}'", arg));
                    }
                }
            }
        }
        Ok(opts)
    }

    fn has_action(&self) -> bool {
        self.refresh || self.apply_rules || self.mark_read || self.mark_unread || self.display
    }
}

fn parse_count(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(format!("invalid count '{}': expected a positive integer", value)),
    }
}

pub fn run_password_command(cmd: &str) -> Result<String, String> {
    let output = Command::new("sh")
        .arg("-c")
        .arg(cmd)
        .output()
        .map_err(|e| format!("failed to execute password command: {}", e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(format!(
            "password command exited with {}: {}",
            output.status, stderr
        ));
    }

    let password = String::from_utf8(output.stdout)
        .map_err(|e| format!("password command output is not valid UTF-8: {}", e))?;

    Ok(password.trim_end_matches('\n').to_string())
}

fn connect_account(account: &AccountConfig) -> Result<JmapClient, String> {
    let password = run_password_command(&account.password_command)?;
    JmapClient::discover(&account.well_known_url, &account.username, &password)
        .map_err(|e| format!("JMAP discovery error: {}", e))
}

fn show_log() -> i32 {
    let path = log::log_path();
    if !path.exists() {
        eprintln!("No log file found at {}", path.display());
        return 1;
    }
    let pager = std::env::var("PAGER").unwrap_or_else(|_| "less".to_string());
    match Command::new(&pager).arg(&path).status() {
        Ok(s) if s.success() => 0,
        Ok(s) => s.code().unwrap_or(1),
        Err(e) => {
            eprintln!("Failed to launch pager '{}': {}", pager, e);
            1
        }
    }
}

/// A missing file at the default location is an empty rule set; an explicit
/// `--rules` path must exist.
fn load_rule_set(path: &Path, explicit: bool) -> Result<RuleSet, RuleSetError> {
    if !explicit && !path.exists() {
        log_info!("[Rules] No rules file at {}, nothing to apply", path.display());
        return Ok(RuleSet::default());
    }
    rules::load_rules(path)
}

fn shorten(s: &str) -> String {
    let mut out: String = s.chars().take(50).collect();
    if s.chars().count() > 50 {
        out.push_str("...");
    }
    out
}

fn print_report(report: &RunReport) {
    for email in &report.emails {
        for failure in &email.condition_failures {
            println!(
                "Rule '{}' condition {} skipped for '{}': {}",
                failure.rule_name,
                failure.index + 1,
                shorten(&email.subject),
                failure.error
            );
        }
        for matched in &email.matches {
            println!("Rule '{}' matched: {}", matched.rule_name, shorten(&email.subject));
            for outcome in &matched.outcomes {
                match &outcome.status {
                    ActionStatus::Applied => println!("  {}: ok", outcome.action),
                    ActionStatus::RemoteFailed(e) => println!("  {}: failed: {}", outcome.action, e),
                    ActionStatus::PartiallyApplied(e) => {
                        println!("  {}: applied remotely, local store not updated: {}", outcome.action, e)
                    }
                }
            }
        }
    }
    println!(
        "Processed {} email(s): {} matched, {} action failure(s), {} condition error(s){}",
        report.emails.len(),
        report.matched_emails(),
        report.failed_actions(),
        report.condition_failures(),
        if report.cancelled { " (cancelled)" } else { "" }
    );
}

fn fetch_and_store(
    mailbox: &dyn MailboxClient,
    store: &Store,
    count: usize,
) -> Result<Vec<EmailRecord>, String> {
    println!("Fetching {} emails...", count);
    let emails = mailbox.fetch_emails(count).map_err(|e| e.to_string())?;
    if emails.is_empty() {
        println!("No emails found");
        return Ok(emails);
    }
    for email in &emails {
        match store.store_email(email) {
            Ok(()) => println!("Stored/Updated email: {}", shorten(&email.subject)),
            Err(e) => {
                log_error!("[Store] Failed to store {}: {}", email.id, e);
                println!("Failed to store email: {}", shorten(&email.subject));
            }
        }
    }
    Ok(emails)
}

fn mark_fetched(
    mailbox: &dyn MailboxClient,
    store: &Store,
    count: usize,
    read: bool,
) -> Result<(), String> {
    let emails = mailbox.fetch_emails(count).map_err(|e| e.to_string())?;
    if emails.is_empty() {
        println!("No emails found");
    }
    let label = if read { "read" } else { "unread" };
    for email in &emails {
        let remote = if read {
            mailbox.mark_read(&email.id)
        } else {
            mailbox.mark_unread(&email.id)
        };
        if let Err(e) = remote {
            println!("Failed to mark as {}: {}: {}", label, shorten(&email.subject), e);
            continue;
        }
        if let Err(e) = store.update_status(&email.id, Some(read), None) {
            log_warn!("[Store] Marked {} remotely but not locally: {}", email.id, e);
        }
        println!("Marked as {}: {}", label, shorten(&email.subject));
    }
    Ok(())
}

fn apply_rules(
    rules: RuleSet,
    mailbox: &dyn MailboxClient,
    store: &Store,
    limit: Option<usize>,
) -> Result<(), String> {
    let engine = RuleEngine::new(rules, mailbox, store).map_err(|e| e.to_string())?;
    if engine.rules().is_empty() {
        println!("No rules defined.");
        return Ok(());
    }
    let report = engine
        .run(limit, signal::cancel_flag())
        .map_err(|e| e.to_string())?;
    print_report(&report);
    Ok(())
}

fn run(opts: &Options, config: &Config, rules: RuleSet) -> Result<(), String> {
    let count = opts.count.unwrap_or(config.mail.default_count);

    let client = connect_account(&config.account)?;
    let mailbox = JmapMailbox::new(client, config.mail.fetch_mailbox.clone());

    if opts.display {
        for email in mailbox.fetch_emails(count).map_err(|e| e.to_string())? {
            println!("{}", email);
        }
        return Ok(());
    }

    let store_path = config.store_path.clone().unwrap_or_else(store::default_path);
    let store = Store::open(&store_path).map_err(|e| e.to_string())?;

    if opts.mark_read || opts.mark_unread {
        if opts.mark_read {
            mark_fetched(&mailbox, &store, count, true)?;
        }
        if opts.mark_unread {
            mark_fetched(&mailbox, &store, count, false)?;
        }
        return Ok(());
    }

    if opts.refresh {
        fetch_and_store(&mailbox, &store, count)?;
    }
    if opts.apply_rules {
        apply_rules(rules, &mailbox, &store, opts.count)?;
    } else if !opts.has_action() {
        let fetched = fetch_and_store(&mailbox, &store, count)?;
        if !fetched.is_empty() {
            apply_rules(rules, &mailbox, &store, opts.count)?;
        }
    }
    Ok(())
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let opts = match Options::parse(&args) {
        Ok(opts) => opts,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!("{}", USAGE);
            std::process::exit(1);
        }
    };

    if opts.help {
        println!("{}", USAGE);
        return;
    }

    if opts.clear_log {
        if let Err(e) = log::clear() {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    }

    if opts.show_log {
        std::process::exit(show_log());
    }

    log::init();

    let config_path = opts
        .config_path
        .clone()
        .unwrap_or_else(config::default_config_path);
    let rules_path = opts
        .rules_path
        .clone()
        .unwrap_or_else(|| config::default_rules_path(&config_path));

    let rules = match load_rule_set(&rules_path, opts.rules_path.is_some()) {
        Ok(rules) => rules,
        Err(e) => {
            log_error!("[Rules] {}", e);
            eprintln!("Failed to load rules from {}: {}", rules_path.display(), e);
            std::process::exit(1);
        }
    };

    if opts.print_rules {
        println!("Rules file: {}", rules_path.display());
        println!("Rules loaded: {}", rules.len());
        println!();
        print!("{}", rules::format_rules_for_display(&rules));
        return;
    }

    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config from {}: {}", config_path.display(), e);
            eprintln!("Create a config file with:");
            eprintln!();
            eprintln!("  [account]");
            eprintln!("  well_known_url = \"https://your-server/.well-known/jmap\"");
            eprintln!("  username = \"you@example.com\"");
            eprintln!("  password_command = \"pass show email/example.com\"");
            std::process::exit(1);
        }
    };

    if let Err(e) = signal::install_interrupt_handler() {
        log_warn!("[Main] Failed to install SIGINT handler: {}", e);
    }

    if let Err(e) = run(&opts, &config, rules) {
        log_error!("[Main] {}", e);
        println!("Error: {}", e);
    }
}
