//! Command-line surface: a `serve` subcommand plus a handful of operator
//! diagnostics. One `Cli` struct carrying global flags, a
//! `#[command(subcommand)]` enum for the operations themselves.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "shiftcall-server")]
#[command(about = "Shift-release voice agent orchestrator")]
#[command(version)]
pub struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "shiftcall.toml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP/webhook server and the cascade queue-poll loop.
    Serve,

    /// Drive the FSM through a scripted phone-auth + DTMF sequence against
    /// the configured catalog, printing every phase transition and
    /// directive. Never touches the telephony carrier or Redis.
    ProbeCallFlow {
        /// Caller phone in E.164, e.g. +61412345678.
        #[arg(long)]
        phone: String,
        /// DTMF digits to feed in sequence after the session starts, e.g. "1234#1".
        #[arg(long, default_value = "")]
        digits: String,
    },

    /// Print the persisted `CascadePlan` for a shift, if one exists.
    InspectCascade {
        shift_id: String,
    },

    /// Exercise the object-store leg of the recording pipeline with a small
    /// throwaway object, verifying bucket/region/credentials are reachable.
    VerifyRecordingPipeline,

    /// Dump the per-provider event stream for one calendar day.
    ReplayEventStream {
        provider: String,
        /// Date in `yyyy-mm-dd` form.
        date: String,
    },
}
