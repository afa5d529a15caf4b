//! Subcommand implementations

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local, Utc};
use tempmail::{
    Account, AccountStore, DefaultSession, ReceivedEmail, TempmailConfig, TokenRefresh,
    open_session,
};

use crate::Command;

/// Width of the subject column in listings
const SUBJECT_WIDTH: usize = 48;

pub fn run(command: Command) -> Result<()> {
    let config = TempmailConfig::load().context("Failed to load configuration")?;

    if let Command::Init = command {
        let path = config.save().context("Failed to write configuration")?;
        println!("Wrote {}", path.display());
        return Ok(());
    }

    let (session, manager) = open_session(&config)?;

    match command {
        Command::Init => Ok(()),
        Command::Status => {
            let storage = session.store();
            if let Some(path) = TempmailConfig::default_config_path() {
                let state = if path.exists() { "" } else { " (not written, using defaults)" };
                println!("Config:   {}{}", path.display(), state);
            }
            println!("Storage:  {}", storage.backend_kind());
            match manager.database() {
                Some(db) => println!("Database: {}", db.describe()),
                None => println!("Database: not configured"),
            }
            if let Some(problem) = storage.problem() {
                match problem.reason {
                    Some(reason) => println!("Problem:  {:?}: {}", reason, problem.message),
                    None => println!("Problem:  {}", problem.message),
                }
            }
            if !storage.is_remote() {
                println!("Data file: {}", config.data_file_path()?.display());
            }
            Ok(())
        }
        Command::Create => create(&session),
        Command::Accounts => accounts(&session),
        Command::Restore { email } => {
            let account = session.restore_account(&email)?;
            println!("{} restored, token valid until {}", account.email, expiry(&account));
            Ok(())
        }
        Command::Fetch { email } => fetch(&session, &email),
        Command::Inbox { email, limit } => inbox(&session, &email, limit),
        Command::Show { id } => show(&session, id),
    }
}

fn create(session: &DefaultSession) -> Result<()> {
    let created = session.create_account()?;
    println!("Address:  {}", created.account.address);
    println!("Password: {}", created.password);
    match created.token {
        Some(_) => println!("Token:    acquired"),
        None => println!("Token:    not acquired, run `tempmail restore` to retry"),
    }
    Ok(())
}

fn accounts(session: &DefaultSession) -> Result<()> {
    let overview = session.token_overview()?;
    if overview.is_empty() {
        println!("No accounts stored");
        return Ok(());
    }
    for status in overview {
        let token = if status.has_valid_token {
            format!("valid until {}", expiry(&status.account))
        } else {
            "expired".to_string()
        };
        println!(
            "{:>4}  {:<40}  {}",
            status.account.id, status.account.email, token
        );
    }
    Ok(())
}

fn fetch(session: &DefaultSession, email: &str) -> Result<()> {
    let account = find_account(session, email)?;
    if session.refresh_token_if_needed(account.id)? == TokenRefresh::Refreshed {
        println!("Token refreshed");
    }
    let stats = session.fetch_and_store_messages(account.id)?;
    println!(
        "{} new message(s) ({} listed, {} already stored, {} unavailable)",
        stats.stored, stats.listed, stats.skipped, stats.failed
    );
    Ok(())
}

fn inbox(session: &DefaultSession, email: &str, limit: usize) -> Result<()> {
    let account = find_account(session, email)?;
    let emails = session.store().get_received_emails_by_account(account.id)?;
    if emails.is_empty() {
        println!("No messages stored for {}", account.email);
        return Ok(());
    }
    for email in emails.iter().take(limit) {
        println!(
            "{:>5}  {}  {:<32}  {}",
            email.id,
            local_time(&email.received_at),
            email.sender,
            truncate(&email.subject, SUBJECT_WIDTH)
        );
    }
    Ok(())
}

fn show(session: &DefaultSession, id: i64) -> Result<()> {
    let Some(email) = session.store().get_received_email_by_id(id)? else {
        bail!("No stored message with id {}", id);
    };
    print_email(&email);
    Ok(())
}

fn find_account(session: &DefaultSession, email: &str) -> Result<Account> {
    session
        .store()
        .get_account_by_email(email)?
        .with_context(|| format!("No stored account for {}", email))
}

fn print_email(email: &ReceivedEmail) {
    println!("From:     {}", email.sender);
    if let Some(recipient) = &email.recipient {
        println!("To:       {}", recipient);
    }
    println!("Date:     {}", local_time(&email.received_at));
    println!("Subject:  {}", email.subject);
    println!();
    println!("{}", email.body);
}

fn expiry(account: &Account) -> String {
    account
        .token_expiry
        .map(|ts| local_time(&ts))
        .unwrap_or_else(|| "-".to_string())
}

fn local_time(ts: &DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}
