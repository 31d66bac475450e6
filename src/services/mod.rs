//! Concrete collaborators: in-memory stand-ins and the SMTP mailbox.

pub mod calendar;
pub mod directory;
pub mod mailbox;
pub mod smtp;

pub use calendar::CommitmentCalendar;
pub use directory::StaticDirectory;
pub use mailbox::{MemoryMailbox, SentReply};
pub use smtp::SmtpMailbox;
