//! Command Handler Module
//!
//! This module implements the eight memkv commands. It validates a tokenized
//! request line, decides whether the command needs a data line, and runs the
//! command against the storage engine.
//!
//! ## Supported Commands
//!
//! ### Retrieval
//! - `get <key>+` - Fetch values
//! - `gets <key>+` - Fetch values with their CAS tokens
//!
//! ### Storage (followed by one data line)
//! - `set <key> <flags> <ttl> <bytes>` - Store unconditionally
//! - `add <key> <flags> <ttl> <bytes>` - Store only if the key is absent
//! - `replace <key> <flags> <ttl> <bytes>` - Store only if the key is present
//! - `append <key> <flags> <ttl> <bytes>` - Add data after an existing value
//! - `prepend <key> <flags> <ttl> <bytes>` - Add data before an existing value
//! - `cas <key> <flags> <ttl> <bytes> <cas>` - Store only if the token still matches
//!
//! ## Two-Phase Dispatch
//!
//! ```text
//!  request line ──> dispatch() ──┬──> Dispatch::Ready(Response)
//!                                │
//!                                └──> Dispatch::AwaitData(StorageCommand)
//!                                              │
//!                       caller reads data line │
//!                                              ▼
//!                                     complete(command, data) ──> Response
//! ```
//!
//! Argument counts are checked in `dispatch()`, so a malformed storage command
//! is rejected before its data line is read. The data line is always read in
//! full before the store is touched; the store lock is never held across I/O.

use crate::protocol::parser::{lenient_i64, lenient_u32, lenient_u64};
use crate::protocol::types::reason;
use crate::protocol::{ParseError, RequestLine, Response, ValueBlock};
use crate::storage::{CasOutcome, Item, MutateMode, StorageEngine};
use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace};

/// Argument count of `set`/`add`/`replace`/`append`/`prepend`
const STORAGE_ARGS: usize = 4;

/// Argument count of `cas`
const CAS_ARGS: usize = 5;

/// Errors a request can fail with before it reaches the store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// The line had no tokens
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The command name is not one we know
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    /// `get`/`gets` without any key
    #[error("no keys given")]
    NoKeys,

    /// Too few or too many arguments
    #[error("'{command}' takes {expected} arguments, got {got}")]
    WrongArity {
        command: &'static str,
        expected: usize,
        got: usize,
    },

    /// The data line does not have the declared length
    #[error("declared {declared} bytes but received {actual}")]
    IncorrectDataLength { declared: i64, actual: usize },
}

impl From<CommandError> for Response {
    fn from(err: CommandError) -> Self {
        match err {
            CommandError::Parse(_) | CommandError::UnknownCommand(_) => Response::Error,
            CommandError::NoKeys => Response::client_error(reason::NO_KEYS),
            CommandError::WrongArity { .. } => Response::client_error(reason::WRONG_ARITY),
            CommandError::IncorrectDataLength { .. } => {
                Response::client_error(reason::INCORRECT_DATA_LENGTH)
            }
        }
    }
}

/// How a storage command treats the existing entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    Set,
    Add,
    Replace,
    Append,
    Prepend,
    Cas { unique: u64 },
}

impl StoreMode {
    /// The protocol name of the command.
    pub fn name(&self) -> &'static str {
        match self {
            StoreMode::Set => "set",
            StoreMode::Add => "add",
            StoreMode::Replace => "replace",
            StoreMode::Append => "append",
            StoreMode::Prepend => "prepend",
            StoreMode::Cas { .. } => "cas",
        }
    }
}

/// A validated storage command waiting for its data line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageCommand {
    pub mode: StoreMode,
    pub key: Bytes,
    pub flags: u32,
    pub ttl: i64,
    /// Declared payload length
    pub bytes: i64,
}

impl StorageCommand {
    /// Builds a storage command from its arguments (key flags ttl bytes [cas]).
    fn from_args(name: &'static str, args: &[Bytes]) -> Result<Self, CommandError> {
        let expected = if name == "cas" { CAS_ARGS } else { STORAGE_ARGS };
        if args.len() != expected {
            return Err(CommandError::WrongArity {
                command: name,
                expected,
                got: args.len(),
            });
        }

        let mode = match name {
            "set" => StoreMode::Set,
            "add" => StoreMode::Add,
            "replace" => StoreMode::Replace,
            "append" => StoreMode::Append,
            "prepend" => StoreMode::Prepend,
            _ => StoreMode::Cas {
                unique: lenient_u64(&args[4]),
            },
        };

        Ok(Self {
            mode,
            key: args[0].clone(),
            flags: lenient_u32(&args[1]),
            ttl: lenient_i64(&args[2]),
            bytes: lenient_i64(&args[3]),
        })
    }

    /// Checks the received payload against the declared length.
    pub fn check_length(&self, data: &[u8]) -> Result<(), CommandError> {
        if i64::try_from(data.len()) == Ok(self.bytes) {
            Ok(())
        } else {
            Err(CommandError::IncorrectDataLength {
                declared: self.bytes,
                actual: data.len(),
            })
        }
    }
}

/// A fully validated request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Get { keys: Vec<Bytes> },
    Gets { keys: Vec<Bytes> },
    Store(StorageCommand),
}

impl Command {
    /// Validates a tokenized request line.
    pub fn parse(request: RequestLine) -> Result<Self, CommandError> {
        if !is_known(&request.name) {
            return Err(CommandError::UnknownCommand(request.name_lossy().into_owned()));
        }

        let RequestLine { name, args } = request;

        match name.as_ref() {
            b"get" | b"gets" => {
                if args.is_empty() {
                    return Err(CommandError::NoKeys);
                }
                if name.as_ref() == b"get" {
                    Ok(Command::Get { keys: args })
                } else {
                    Ok(Command::Gets { keys: args })
                }
            }
            b"set" => StorageCommand::from_args("set", &args).map(Command::Store),
            b"add" => StorageCommand::from_args("add", &args).map(Command::Store),
            b"replace" => StorageCommand::from_args("replace", &args).map(Command::Store),
            b"append" => StorageCommand::from_args("append", &args).map(Command::Store),
            b"prepend" => StorageCommand::from_args("prepend", &args).map(Command::Store),
            _ => StorageCommand::from_args("cas", &args).map(Command::Store),
        }
    }

    /// Returns true if a data line follows this command.
    pub fn expects_data(&self) -> bool {
        matches!(self, Command::Store(_))
    }

    /// The protocol name of the command.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Get { .. } => "get",
            Command::Gets { .. } => "gets",
            Command::Store(cmd) => cmd.mode.name(),
        }
    }
}

/// What the caller has to do after dispatching a request line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Send this reply
    Ready(Response),
    /// Read one data line and pass it to [`CommandHandler::complete`]
    AwaitData(StorageCommand),
}

impl From<Item> for ValueBlock {
    fn from(item: Item) -> Self {
        ValueBlock {
            key: item.key,
            flags: item.flags,
            data: item.data,
            cas: item.cas,
        }
    }
}

/// Runs commands against the shared storage engine.
#[derive(Clone)]
pub struct CommandHandler {
    /// The storage engine
    storage: Arc<StorageEngine>,
}

impl CommandHandler {
    /// Creates a new command handler with the given storage engine.
    pub fn new(storage: Arc<StorageEngine>) -> Self {
        Self { storage }
    }

    /// Parses and validates one request line (terminator already stripped).
    pub fn parse(&self, line: &Bytes) -> Result<Command, CommandError> {
        let request = RequestLine::parse(line)?;
        Command::parse(request)
    }

    /// Routes a request line to its handler.
    ///
    /// Retrievals and every kind of error are answered right away. Storage
    /// commands come back as [`Dispatch::AwaitData`].
    pub fn dispatch(&self, line: &Bytes) -> Dispatch {
        let command = match self.parse(line) {
            Ok(command) => command,
            Err(e) => {
                debug!(error = %e, "Rejected request");
                return Dispatch::Ready(e.into());
            }
        };

        trace!(
            command = command.name(),
            awaits_data = command.expects_data(),
            "Dispatching"
        );

        match command {
            Command::Get { keys } => Dispatch::Ready(self.cmd_get(&keys, false)),
            Command::Gets { keys } => Dispatch::Ready(self.cmd_get(&keys, true)),
            Command::Store(cmd) => Dispatch::AwaitData(cmd),
        }
    }

    /// Finishes a storage command once its data line has arrived.
    pub fn complete(&self, cmd: StorageCommand, data: Bytes) -> Response {
        if let Err(e) = cmd.check_length(&data) {
            debug!(command = cmd.mode.name(), error = %e, "Rejected data line");
            return e.into();
        }

        trace!(
            command = cmd.mode.name(),
            key = %String::from_utf8_lossy(&cmd.key),
            bytes = data.len(),
            "Executing storage command"
        );

        let StorageCommand {
            mode,
            key,
            flags,
            ttl,
            ..
        } = cmd;

        match mode {
            StoreMode::Set => {
                self.storage.store(key, flags, ttl, data);
                Response::Stored
            }
            StoreMode::Add => stored_or_not(self.storage.store_if_absent(key, flags, ttl, data)),
            StoreMode::Replace => {
                stored_or_not(self.storage.store_if_present(key, flags, ttl, data))
            }
            StoreMode::Append => stored_or_not(self.storage.mutate_if_present(
                key,
                flags,
                ttl,
                data,
                MutateMode::Append,
            )),
            StoreMode::Prepend => stored_or_not(self.storage.mutate_if_present(
                key,
                flags,
                ttl,
                data,
                MutateMode::Prepend,
            )),
            StoreMode::Cas { unique } => {
                match self.storage.compare_and_swap(key, flags, ttl, data, unique) {
                    CasOutcome::Stored => Response::Stored,
                    CasOutcome::Exists => Response::Exists,
                    CasOutcome::NotFound => Response::NotFound,
                }
            }
        }
    }

    /// get / gets
    fn cmd_get(&self, keys: &[Bytes], with_cas: bool) -> Response {
        let items = if with_cas {
            self.storage.get_with_cas(keys)
        } else {
            self.storage.get(keys)
        };

        trace!(requested = keys.len(), found = items.len(), with_cas, "Retrieval");

        Response::Values(items.into_iter().map(ValueBlock::from).collect())
    }
}

/// Command names are case-sensitive.
fn is_known(name: &[u8]) -> bool {
    matches!(
        name,
        b"get" | b"gets" | b"set" | b"add" | b"replace" | b"append" | b"prepend" | b"cas"
    )
}

#[inline]
fn stored_or_not(stored: bool) -> Response {
    if stored {
        Response::Stored
    } else {
        Response::NotStored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_handler() -> CommandHandler {
        let storage = Arc::new(StorageEngine::new());
        CommandHandler::new(storage)
    }

    /// Runs one request line, feeding `data` if the command asks for it.
    fn run(handler: &CommandHandler, line: &str, data: &str) -> Vec<u8> {
        let response = match handler.dispatch(&Bytes::from(line.to_string())) {
            Dispatch::Ready(response) => response,
            Dispatch::AwaitData(cmd) => handler.complete(cmd, Bytes::from(data.to_string())),
        };
        response.serialize()
    }

    fn gets_token(handler: &CommandHandler, key: &str) -> u64 {
        match handler.dispatch(&Bytes::from(format!("gets {}", key))) {
            Dispatch::Ready(Response::Values(blocks)) => blocks[0].cas.unwrap(),
            other => panic!("unexpected dispatch: {:?}", other),
        }
    }

    #[test]
    fn test_set_get() {
        let handler = create_handler();

        assert_eq!(run(&handler, "set K1 0 0 11", "Test Data 1"), b"STORED\r\n");
        assert_eq!(
            run(&handler, "get K1", ""),
            b"VALUE K1 0 11\r\nTest Data 1\r\nEND\r\n"
        );
    }

    #[test]
    fn test_get_skips_missing_keys() {
        let handler = create_handler();
        run(&handler, "set K1 0 0 11", "Test Data 1");

        assert_eq!(
            run(&handler, "get K1 K2", ""),
            b"VALUE K1 0 11\r\nTest Data 1\r\nEND\r\n"
        );
        assert_eq!(run(&handler, "get K3", ""), b"END\r\n");
    }

    #[test]
    fn test_get_multiple_keys() {
        let handler = create_handler();
        run(&handler, "set Key1 0 0 11", "Test Data 1");
        run(&handler, "set Key2 3 0 11", "Test Data 2");

        assert_eq!(
            run(&handler, "get Key1 Key2", ""),
            b"VALUE Key1 0 11\r\nTest Data 1\r\nVALUE Key2 3 11\r\nTest Data 2\r\nEND\r\n"
        );
    }

    #[test]
    fn test_get_without_keys() {
        let handler = create_handler();
        assert_eq!(run(&handler, "get", ""), b"CLIENT_ERROR | NO KEYS\r\n");
        assert_eq!(run(&handler, "gets ", ""), b"CLIENT_ERROR | NO KEYS\r\n");
    }

    #[test]
    fn test_gets_includes_cas() {
        let handler = create_handler();
        run(&handler, "set K1 5 0 4", "data");
        let token = gets_token(&handler, "K1");

        assert_eq!(
            run(&handler, "gets K1", ""),
            format!("VALUE K1 5 4 {}\r\ndata\r\nEND\r\n", token).as_bytes()
        );
    }

    #[test]
    fn test_wrong_arity() {
        let handler = create_handler();

        for line in [
            "set K1 0 0",
            "set K1 0 0 4 extra",
            "add K1",
            "replace",
            "append K1 0 0",
            "prepend K1 0 0 1 2",
            "cas K1 0 0 4",
            "cas K1 0 0 4 1 2",
        ] {
            assert_eq!(
                handler.dispatch(&Bytes::from(line)),
                Dispatch::Ready(Response::client_error(reason::WRONG_ARITY)),
                "line: {}",
                line
            );
        }
    }

    #[test]
    fn test_unknown_and_empty_commands() {
        let handler = create_handler();

        assert_eq!(run(&handler, "delete K1", ""), b"ERROR\r\n");
        assert_eq!(run(&handler, "GET K1", ""), b"ERROR\r\n");
        assert_eq!(run(&handler, "", ""), b"ERROR\r\n");
        assert_eq!(run(&handler, "   ", ""), b"ERROR\r\n");
    }

    #[test]
    fn test_incorrect_data_length_leaves_value() {
        let handler = create_handler();
        run(&handler, "set K1 0 0 3", "old");

        assert_eq!(
            run(&handler, "set K1 0 0 10", "short"),
            b"CLIENT_ERROR | INCORRECT DATA LENGTH\r\n"
        );
        assert_eq!(
            run(&handler, "append K1 0 0 1", "toolong"),
            b"CLIENT_ERROR | INCORRECT DATA LENGTH\r\n"
        );
        assert_eq!(run(&handler, "get K1", ""), b"VALUE K1 0 3\r\nold\r\nEND\r\n");
    }

    #[test]
    fn test_incorrect_data_length_on_missing_key() {
        let handler = create_handler();
        assert_eq!(
            run(&handler, "add K1 0 0 2", "abc"),
            b"CLIENT_ERROR | INCORRECT DATA LENGTH\r\n"
        );
        assert_eq!(run(&handler, "get K1", ""), b"END\r\n");
    }

    #[test]
    fn test_add() {
        let handler = create_handler();

        assert_eq!(run(&handler, "add K1 0 0 8", "testData"), b"STORED\r\n");
        assert_eq!(run(&handler, "add K1 0 0 8", "newValue"), b"NOT_STORED\r\n");
        assert_eq!(
            run(&handler, "get K1", ""),
            b"VALUE K1 0 8\r\ntestData\r\nEND\r\n"
        );
    }

    #[test]
    fn test_replace() {
        let handler = create_handler();

        assert_eq!(run(&handler, "replace K1 0 0 8", "testData"), b"NOT_STORED\r\n");
        assert_eq!(run(&handler, "get K1", ""), b"END\r\n");

        run(&handler, "set K1 0 0 3", "old");
        assert_eq!(run(&handler, "replace K1 2 0 3", "new"), b"STORED\r\n");
        assert_eq!(run(&handler, "get K1", ""), b"VALUE K1 2 3\r\nnew\r\nEND\r\n");
    }

    #[test]
    fn test_append_prepend() {
        let handler = create_handler();

        assert_eq!(run(&handler, "append K1 0 0 1", "x"), b"NOT_STORED\r\n");
        assert_eq!(run(&handler, "prepend K1 0 0 1", "x"), b"NOT_STORED\r\n");
        assert_eq!(run(&handler, "get K1", ""), b"END\r\n");

        run(&handler, "set K1 0 0 4", "Data");
        assert_eq!(run(&handler, "append K1 0 0 4", "Tail"), b"STORED\r\n");
        assert_eq!(run(&handler, "prepend K1 0 0 4", "Head"), b"STORED\r\n");
        assert_eq!(
            run(&handler, "get K1", ""),
            b"VALUE K1 0 12\r\nHeadDataTail\r\nEND\r\n"
        );
    }

    #[test]
    fn test_cas() {
        let handler = create_handler();
        run(&handler, "set K1 0 0 5", "value");
        let token = gets_token(&handler, "K1");

        let line = format!("cas K1 0 0 8 {}", token);
        assert_eq!(run(&handler, &line, "testData"), b"STORED\r\n");
        assert_eq!(run(&handler, &line, "testData"), b"EXISTS\r\n");
        assert_ne!(gets_token(&handler, "K1"), token);
    }

    #[test]
    fn test_cas_missing_key() {
        let handler = create_handler();
        assert_eq!(
            run(&handler, "cas NEWKEY 0 0 8 12345", "testData"),
            b"NOT_FOUND\r\n"
        );
        assert_eq!(run(&handler, "get NEWKEY", ""), b"END\r\n");
    }

    #[test]
    fn test_cas_with_garbage_token_is_stale() {
        let handler = create_handler();
        run(&handler, "set K1 0 0 5", "value");

        assert_eq!(run(&handler, "cas K1 0 0 1 nope", "x"), b"EXISTS\r\n");
    }

    #[test]
    fn test_lenient_numeric_arguments() {
        let handler = create_handler();

        // Non-numeric flags/ttl become 0, non-numeric length becomes 0
        assert_eq!(run(&handler, "set K1 abc xyz 0", ""), b"STORED\r\n");
        assert_eq!(run(&handler, "get K1", ""), b"VALUE K1 0 0\r\n\r\nEND\r\n");

        assert_eq!(run(&handler, "set K2 12ab 0 3x", "abc"), b"STORED\r\n");
        assert_eq!(run(&handler, "get K2", ""), b"VALUE K2 12 3\r\nabc\r\nEND\r\n");

        assert_eq!(
            run(&handler, "set K3 0 0 -1", ""),
            b"CLIENT_ERROR | INCORRECT DATA LENGTH\r\n"
        );
    }

    #[test]
    fn test_parse_storage_command() {
        let handler = create_handler();
        let command = handler.parse(&Bytes::from("cas K1 4 60 8 99")).unwrap();

        assert!(command.expects_data());
        assert_eq!(command.name(), "cas");
        assert_eq!(
            command,
            Command::Store(StorageCommand {
                mode: StoreMode::Cas { unique: 99 },
                key: Bytes::from("K1"),
                flags: 4,
                ttl: 60,
                bytes: 8,
            })
        );
    }

    #[test]
    fn test_command_error_messages() {
        let err = CommandError::WrongArity {
            command: "set",
            expected: 4,
            got: 2,
        };
        assert_eq!(err.to_string(), "'set' takes 4 arguments, got 2");
        assert_eq!(
            CommandError::from(ParseError::EmptyLine).to_string(),
            "empty request line"
        );

        let handler = create_handler();
        assert_eq!(
            handler.parse(&Bytes::from("GET K1")),
            Err(CommandError::UnknownCommand("GET".to_string()))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry_through_commands() {
        let handler = create_handler();
        run(&handler, "set K1 0 5 1", "v");

        tokio::time::advance(std::time::Duration::from_secs(4)).await;
        assert_eq!(run(&handler, "get K1", ""), b"VALUE K1 0 1\r\nv\r\nEND\r\n");

        tokio::time::advance(std::time::Duration::from_secs(1)).await;
        assert_eq!(run(&handler, "get K1", ""), b"END\r\n");
        assert_eq!(run(&handler, "add K1 0 0 1", "w"), b"STORED\r\n");
    }
}
