//! Inbound message dispatch for wabot.
//!
//! The transport hands each message to [`Dispatcher::handle_inbound`], which
//! runs it through the admission gates in `wabot-guard` and executes the
//! resolved [`Command`]. Replies go out through the injected [`ReplySink`].

pub mod admin;
pub mod builtin;
pub mod command;
pub mod dispatcher;
pub mod messages;
pub mod sweeper;
pub mod transport;

pub use command::{
    Command, CommandContext, CommandDescriptor, CommandError, CommandRegistry, RegistryError,
};
pub use dispatcher::{Dispatcher, Outcome};
pub use sweeper::spawn_sweeper;
pub use transport::{InboundMessage, ReplySink, TransportError};

/// A registry holding the built-in and owner commands.
pub fn default_registry() -> Result<CommandRegistry, RegistryError> {
    let mut registry = CommandRegistry::new();
    builtin::register_builtins(&mut registry)?;
    admin::register_admin(&mut registry)?;
    Ok(registry)
}
