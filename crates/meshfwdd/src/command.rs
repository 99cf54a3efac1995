//! Console commands read from stdin.
//!
//! ```text
//! /group 7 8        create a group with nodes 7 and 8
//! /invite 9         invite node 9 into the current group
//! /discover         broadcast our beacon
//! /peers            list discovered peers
//! /quit
//! @u2 hello         message user u2
//! hello             message the current group
//! ```

use meshfwd_core::Gid;
use meshfwd_services::Destination;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    CreateGroup(Vec<Gid>),
    Invite(Vec<Gid>),
    Discover,
    Peers,
    Quit,
    Send {
        destination: Destination,
        text: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    #[error("empty line")]
    Empty,
    #[error("unknown command /{0}")]
    Unknown(String),
    #[error("not a gid: {0}")]
    BadGid(String),
    #[error("{0} needs at least one argument")]
    MissingArgument(&'static str),
}

pub fn parse(line: &str) -> Result<Command, CommandError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(CommandError::Empty);
    }

    if let Some(rest) = line.strip_prefix('/') {
        let mut words = rest.split_whitespace();
        let name = words.next().unwrap_or_default();
        return match name {
            "group" => Ok(Command::CreateGroup(gids(words, "/group")?)),
            "invite" => Ok(Command::Invite(gids(words, "/invite")?)),
            "discover" => Ok(Command::Discover),
            "peers" => Ok(Command::Peers),
            "quit" | "exit" => Ok(Command::Quit),
            other => Err(CommandError::Unknown(other.to_string())),
        };
    }

    if let Some(rest) = line.strip_prefix('@') {
        let (uid, text) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        let text = text.trim();
        if uid.is_empty() || text.is_empty() {
            return Err(CommandError::MissingArgument("@uid"));
        }
        return Ok(Command::Send {
            destination: Destination::users([uid]),
            text: text.to_string(),
        });
    }

    Ok(Command::Send {
        destination: Destination::Group,
        text: line.to_string(),
    })
}

fn gids<'a>(
    words: impl Iterator<Item = &'a str>,
    command: &'static str,
) -> Result<Vec<Gid>, CommandError> {
    let gids = words
        .map(|w| w.parse().map_err(|_| CommandError::BadGid(w.to_string())))
        .collect::<Result<Vec<Gid>, _>>()?;
    if gids.is_empty() {
        return Err(CommandError::MissingArgument(command));
    }
    Ok(gids)
}
