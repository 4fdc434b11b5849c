//! Composition root for the gateway OTA agent.
//!
//! Wires concrete adapters (`StdFilesystem`, `ReqwestHttpClient`,
//! `SerialExtMcu`) into an [`Agent`], spawns the Worker on its own named
//! thread, and feeds it notices read as newline-delimited JSON objects
//! from standard input. The device-twin/cloud-messaging plumbing that
//! would normally produce those notices is an external collaborator this
//! binary does not implement; stdin stands in for it.

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

mod apply;
mod config;
mod download;
mod error;
mod extmcu;
mod fs;
mod notice;
mod progress;
mod queue;
mod state;
mod thread_util;
mod verify;
mod worker;

use config::AgentConfig;
use download::ReqwestHttpClient;
use extmcu::SerialExtMcu;
use fs::StdFilesystem;
use worker::Agent;

#[derive(Parser, Debug)]
#[command(name = "ota-agent")]
#[command(about = "Gateway OTA update agent")]
struct Args {
    /// Path to the JSON configuration file.
    #[arg(short, long, default_value = "/etc/ota-agent/config.json")]
    config: PathBuf,

    /// Directory used to derive defaults when the config file is absent.
    #[arg(long, default_value = "/var/lib/ota-agent")]
    state_dir: PathBuf,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = AgentConfig::load_or_default(&args.config, &args.state_dir);

    let mut builder = env_logger::Builder::new();
    builder.filter_level(config.log_level.as_level_filter());
    builder.init();

    info!("starting ota-agent");
    info!(
        "config: image_path={}, queue_capacity={}",
        config.image_path, config.queue_capacity
    );

    let fs = Arc::new(StdFilesystem::new(&config.flash_root).context("initializing flash filesystem")?);

    let ca_bundle = std::fs::read(config.ca_bundle_path()).context("reading CA bundle")?;
    let http = Arc::new(ReqwestHttpClient::new(&ca_bundle).context("building HTTPS client")?);

    let serial = OpenOptions::new()
        .read(true)
        .write(true)
        .open(&config.extmcu_device_path)
        .with_context(|| format!("opening extmcu device {}", config.extmcu_device_path.display()))?;
    let extmcu = Arc::new(SerialExtMcu::new(serial));

    let agent = Arc::new(Agent::new(config.clone(), fs, http, extmcu));

    let progress_file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(&config.mutable_file_path)
        .with_context(|| format!("opening progress record at {}", config.mutable_file_path.display()))?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let worker_agent = agent.clone();
    let worker_shutdown = shutdown.clone();
    let worker_handle = thread_util::spawn_named("ota-worker", move || {
        worker::run(&worker_agent, progress_file, &worker_shutdown);
    });

    run_notice_intake(&agent);

    shutdown.store(true, std::sync::atomic::Ordering::Relaxed);
    // The Worker may be blocked in `RequestQueue::dequeue`; nudge it with a
    // harmless enqueue so it observes the shutdown flag promptly.
    agent.queue.enqueue(queue::UpdateRequest {
        version: 0,
        size: 0,
        url: String::new(),
        sas: String::new(),
        sha256_hex: String::new(),
    });
    let _ = worker_handle.join();

    Ok(())
}

/// Reads newline-delimited JSON objects from stdin, each describing one
/// notice's fields, until EOF.
fn run_notice_intake(agent: &Agent) {
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("notice intake: error reading stdin: {e}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let fields = match parse_notice_line(&line) {
            Some(fields) => fields,
            None => {
                warn!("notice intake: malformed json line, dropping");
                continue;
            }
        };
        notice::submit(&fields, &agent.queue);
    }
    info!("notice intake: stdin closed, shutting down");
}

fn parse_notice_line(line: &str) -> Option<HashMap<String, String>> {
    let value: serde_json::Value = serde_json::from_str(line).ok()?;
    let object = value.as_object()?;
    Some(
        object
            .iter()
            .map(|(k, v)| (k.clone(), json_value_to_field(v)))
            .collect(),
    )
}

fn json_value_to_field(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
