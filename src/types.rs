/// Shared types used across the codebase

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Error for an action or command name that is not recognised
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown {kind} '{name}'")]
pub struct UnknownName {
    pub kind: &'static str,
    pub name: String,
}

/// Operations on the protected user table, taken from `/user/:action`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserAction {
    Create,
    Read,
    Update,
    Delete,
    Restore,
    Drop,
}

impl FromStr for UserAction {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(UserAction::Create),
            "read" => Ok(UserAction::Read),
            "update" => Ok(UserAction::Update),
            "delete" => Ok(UserAction::Delete),
            "restore" => Ok(UserAction::Restore),
            "drop" => Ok(UserAction::Drop),
            _ => Err(UnknownName { kind: "user action", name: s.to_string() }),
        }
    }
}

/// Operations on generic tables, taken from `/table/:action` or `/data/:action`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableAction {
    Create,
    Read,
    Add,
    Update,
    Delete,
    Restore,
    Drop,
}

impl TableAction {
    /// Structural changes need an admin or a token; row access needs any principal
    pub fn is_structural(self) -> bool {
        matches!(
            self,
            TableAction::Create | TableAction::Delete | TableAction::Restore | TableAction::Drop
        )
    }
}

impl FromStr for TableAction {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create" => Ok(TableAction::Create),
            "read" => Ok(TableAction::Read),
            "add" => Ok(TableAction::Add),
            "update" => Ok(TableAction::Update),
            "delete" => Ok(TableAction::Delete),
            "restore" => Ok(TableAction::Restore),
            "drop" => Ok(TableAction::Drop),
            _ => Err(UnknownName { kind: "table action", name: s.to_string() }),
        }
    }
}

/// Admin commands accepted by `/cmd`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    Help,
    Users,
    Admins,
    Deleted,
    Tables,
    Reload,
    Restart,
    Stop,
}

impl Command {
    pub const ALL: [Command; 8] = [
        Command::Help,
        Command::Users,
        Command::Admins,
        Command::Deleted,
        Command::Tables,
        Command::Reload,
        Command::Restart,
        Command::Stop,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Command::Help => "help",
            Command::Users => "users",
            Command::Admins => "admins",
            Command::Deleted => "deleted",
            Command::Tables => "tables",
            Command::Reload => "reload",
            Command::Restart => "restart",
            Command::Stop => "stop",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Command::Help => "list available commands",
            Command::Users => "list active users",
            Command::Admins => "list active admins",
            Command::Deleted => "list soft-deleted users",
            Command::Tables => "list live and deleted tables",
            Command::Reload => "re-read the token file and refresh cached lists",
            Command::Restart => "rebuild server state and rebind the listener",
            Command::Stop => "shut the server down gracefully",
        }
    }
}

impl FromStr for Command {
    type Err = UnknownName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Command::ALL
            .into_iter()
            .find(|c| c.name() == wanted)
            .ok_or_else(|| UnknownName { kind: "command", name: s.trim().to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_actions() {
        assert_eq!("restore".parse::<UserAction>(), Ok(UserAction::Restore));
        assert_eq!("add".parse::<TableAction>(), Ok(TableAction::Add));
        assert!("add".parse::<UserAction>().is_err());
        assert!("Create".parse::<TableAction>().is_err());
    }

    #[test]
    fn structural_actions() {
        assert!(TableAction::Drop.is_structural());
        assert!(!TableAction::Update.is_structural());
    }

    #[test]
    fn parses_commands_loosely() {
        assert_eq!(" Users ".parse::<Command>(), Ok(Command::Users));
        let err = "format c:".parse::<Command>().unwrap_err();
        assert_eq!(err.to_string(), "Unknown command 'format c:'");
        for command in Command::ALL {
            assert_eq!(command.name().parse::<Command>(), Ok(command));
        }
    }
}
