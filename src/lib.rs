//! # IT-ERA Desk
//!
//! Lead intake service behind the IT-ERA marketing site.
//!
//! The site posts its contact form and chat widget here. Contact requests
//! are validated and relayed to the team through the Resend email API;
//! chat messages are classified by intent and urgency, answered from
//! canned replies or a language model, scored as leads and escalated to
//! Microsoft Teams when a human should take over.
//!
//! ## Architecture
//!
//! ```text
//!   site form ──▶ POST /api/contact ──▶ contact ──▶ mailer (Resend)
//!                                         │    └──▶ contacts (SQLite)
//!   chat widget ─▶ POST /api/chat ────▶ chat ──┬─▶ intent + triage
//!                                              ├─▶ replies / ai
//!                                              ├─▶ lead score
//!                                              └─▶ teams (escalation)
//!                       ratelimit · sessions · counters ──▶ kv
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! itera init                         # create database
//! itera classify "ransomware sul server"
//! itera serve                        # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Wire and session types |
//! | [`validate`] | Contact form validation and sanitising |
//! | [`triage`] | Support category and priority classification |
//! | [`intent`] | Sales intent classification |
//! | [`replies`] | Canned chat replies |
//! | [`lead`] | Lead scoring |
//! | [`kv`] | Expiring key-value storage |
//! | [`ratelimit`] | Per-IP fixed-window limits |
//! | [`mailer`] | Resend email client |
//! | [`templates`] | Email templates |
//! | [`contact`] | Contact form pipeline |
//! | [`contacts`] | Stored submissions |
//! | [`teams`] | Teams lead alerts |
//! | [`ai`] | Optional language-model replies |
//! | [`chat`] | Chat engine |
//! | [`server`] | HTTP API |
//! | [`stats`] | Lead overview |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod ai;
pub mod chat;
pub mod config;
pub mod contact;
pub mod contacts;
pub mod db;
pub mod intent;
pub mod kv;
pub mod lead;
pub mod mailer;
pub mod migrate;
pub mod models;
pub mod ratelimit;
pub mod replies;
pub mod server;
pub mod stats;
pub mod teams;
pub mod templates;
pub mod triage;
pub mod validate;
