//! courseteen-chat: voice-enabled course assistant chat.
//!
//! Typed or spoken questions go through the [`resolver::ReplyResolver`]
//! (canned greeting and catalog replies, else a remote answering backend).
//! The [`controller::ConversationController`] owns the transcript and the
//! IDLE / AWAITING_REPLY / LISTENING state machine; the terminal front end
//! and the HTTP state API both drive it through a
//! [`controller::ControllerHandle`].

pub mod api;
pub mod backend;
pub mod config;
pub mod controller;
pub mod error;
pub mod repl;
pub mod resolver;
pub mod speech;
pub mod turn;

pub use error::{Error, Result};
