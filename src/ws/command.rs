/// Out-of-band queries against the hub registry
///
/// A `Command` carries an operation, an argument and the caller's result
/// channel. Submission reserves one slot of that channel up front, so the
/// event loop answers through the reserved permit and never waits on the
/// caller.
use std::sync::Arc;
use tokio::sync::mpsc;

use super::client::{Client, ClientId};
use crate::errors::HubError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOp {
    /// Number of registered clients
    OnlineCount,
    /// Registered client for an identity
    GetClient,
    /// Any code the loop does not know
    Other(u16),
}

impl CommandOp {
    pub fn code(&self) -> u16 {
        match self {
            CommandOp::OnlineCount => 0,
            CommandOp::GetClient => 1,
            CommandOp::Other(code) => *code,
        }
    }

    pub fn from_code(code: u16) -> Self {
        match code {
            0 => CommandOp::OnlineCount,
            1 => CommandOp::GetClient,
            other => CommandOp::Other(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandArg {
    None,
    Id(ClientId),
    Text(String),
}

#[derive(Debug, Clone)]
pub enum CommandValue {
    OnlineCount(usize),
    /// `None` when nothing is registered under the identity
    Client(Option<Arc<Client>>),
}

pub type CommandResult = Result<CommandValue, HubError>;

pub struct Command {
    pub op: CommandOp,
    pub arg: CommandArg,
    pub result: mpsc::Sender<CommandResult>,
}

impl Command {
    pub fn new(op: CommandOp, arg: CommandArg, result: mpsc::Sender<CommandResult>) -> Self {
        Self { op, arg, result }
    }

    pub fn online_count(result: mpsc::Sender<CommandResult>) -> Self {
        Self::new(CommandOp::OnlineCount, CommandArg::None, result)
    }

    pub fn get_client(id: ClientId, result: mpsc::Sender<CommandResult>) -> Self {
        Self::new(CommandOp::GetClient, CommandArg::Id(id), result)
    }

    /// Reserve the reply slot; fails when the result channel has no room
    pub(crate) fn reserve(self) -> Result<QueuedCommand, HubError> {
        let reply = self
            .result
            .try_reserve_owned()
            .map_err(|_| HubError::InvalidChannel)?;

        Ok(QueuedCommand {
            op: self.op,
            arg: self.arg,
            reply,
        })
    }
}

/// A command accepted for the event loop, holding its reply permit
pub(crate) struct QueuedCommand {
    pub op: CommandOp,
    pub arg: CommandArg,
    reply: mpsc::OwnedPermit<CommandResult>,
}

impl QueuedCommand {
    pub fn reply(self, result: CommandResult) {
        self.reply.send(result);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_codes() {
        assert_eq!(CommandOp::from_code(0), CommandOp::OnlineCount);
        assert_eq!(CommandOp::from_code(1), CommandOp::GetClient);
        assert_eq!(CommandOp::from_code(42), CommandOp::Other(42));
        assert_eq!(CommandOp::Other(42).code(), 42);
    }

    #[tokio::test]
    async fn test_full_result_channel_is_rejected() {
        let (tx, _rx) = mpsc::channel(1);
        tx.send(Ok(CommandValue::OnlineCount(0))).await.unwrap();

        let result = Command::online_count(tx).reserve();
        assert!(matches!(result, Err(HubError::InvalidChannel)));
    }

    #[tokio::test]
    async fn test_reserved_reply_is_delivered() {
        let (tx, mut rx) = mpsc::channel(1);
        let queued = Command::get_client(3, tx).reserve().unwrap();
        assert_eq!(queued.arg, CommandArg::Id(3));

        queued.reply(Err(HubError::InvalidArgs));
        assert!(matches!(rx.recv().await, Some(Err(HubError::InvalidArgs))));
    }
}
