//! Database diagnostics entry point.
//!
//! # Responsibility
//! - Open a SQLite database through `tablerow_core` and report on it.
//! - Keep output deterministic for scripting.
//!
//! Usage: `tablerow_cli <test|info|describe> <sqlite-path> [table]`

use log::info;
use std::process::ExitCode;
use tablerow_core::{init_stderr_logging, open_database, DbConfig, DbResult};

const USAGE: &str = "usage: tablerow_cli <test|info|describe> <sqlite-path> [table]";

enum Command {
    Test,
    Info,
    Describe(String),
}

fn parse_args(args: &[String]) -> Result<(Command, String), String> {
    let (command, path) = match args {
        [command, path, ..] => (command.as_str(), path.clone()),
        _ => return Err(USAGE.to_string()),
    };
    let command = match (command, args.get(2)) {
        ("test", None) => Command::Test,
        ("info", None) => Command::Info,
        ("describe", Some(table)) => Command::Describe(table.clone()),
        ("describe", None) => return Err("describe needs a table name".to_string()),
        _ => return Err(USAGE.to_string()),
    };
    Ok((command, path))
}

fn run(command: &Command, path: &str) -> DbResult<String> {
    let database = open_database(&DbConfig::sqlite(path))?;
    match command {
        Command::Test => {
            database.check()?;
            Ok("ok".to_string())
        }
        Command::Info => Ok(database.info()?.to_string()),
        Command::Describe(table) => {
            let conn = database.connection()?;
            let schema = database.catalog().columns(&conn, table)?;
            let mut lines = vec![format!("table: {}", schema.name())];
            for column in schema.columns() {
                let marker = if column.primary_key { " (pk)" } else { "" };
                lines.push(format!(
                    "  {} {}{}",
                    column.canonical_name, column.sql_type, marker
                ));
            }
            Ok(lines.join("\n"))
        }
    }
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (command, path) = match parse_args(&args) {
        Ok(parsed) => parsed,
        Err(message) => {
            eprintln!("{message}");
            return ExitCode::from(2);
        }
    };
    if let Err(err) = init_stderr_logging("warn") {
        eprintln!("logging disabled: {err}");
    }
    info!("event=cli_start module=cli status=start command={}", args[0]);

    match run(&command, &path) {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_args, run, Command};

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn parses_known_commands() {
        assert!(matches!(
            parse_args(&args(&["test", "app.db"])),
            Ok((Command::Test, ref path)) if path == "app.db"
        ));
        assert!(matches!(
            parse_args(&args(&["describe", "app.db", "widgets"])),
            Ok((Command::Describe(ref table), _)) if table == "widgets"
        ));
        assert!(parse_args(&args(&["describe", "app.db"])).is_err());
        assert!(parse_args(&args(&["drop", "app.db"])).is_err());
        assert!(parse_args(&args(&[])).is_err());
    }

    #[test]
    fn describe_lists_columns_with_key_marker() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cli.db");
        let conn = rusqlite::Connection::open(&path).unwrap();
        conn.execute_batch("CREATE TABLE widgets (id INTEGER PRIMARY KEY, name TEXT);")
            .unwrap();
        drop(conn);

        let path = path.to_string_lossy().to_string();
        assert_eq!(run(&Command::Test, &path).unwrap(), "ok");
        let described = run(&Command::Describe("widgets".into()), &path).unwrap();
        assert_eq!(
            described,
            "table: widgets\n  id INTEGER (pk)\n  name TEXT"
        );
    }
}
