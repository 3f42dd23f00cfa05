//! Mailer adapters. SendGrid when configured, Disabled otherwise.

pub mod disabled;
pub mod sendgrid;

pub use disabled::DisabledMailer;
pub use sendgrid::SendgridMailer;
