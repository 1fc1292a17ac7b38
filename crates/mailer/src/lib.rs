pub mod client;

pub use client::{InvitationEmail, MailerClient, MailerError, SentMessage};
