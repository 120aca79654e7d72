//! Minimal CLI for the sealed-ballot primitives.
//!
//! Generates salts, computes and checks commitments, and runs a scripted
//! three-voter proposal against an in-process ledger on a manual clock.

use sealed_ballot::{
    make_commit, verify_commit, CommitHash, GovernanceConfig, Ledger, LocalId, ManualClock,
    OsSaltSource, ProposalDraft, Salt, SaltSource, SeededSaltSource, SharedLedger, Vote, VoterId,
    VotingClient,
};
use serde_json::json;
use std::env;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

const SIMULATION_START: u64 = 1_700_000_000;

fn fatal(message: &str) -> ! {
    eprintln!("{message}");
    std::process::exit(1);
}

fn print_help() {
    println!("Usage: ballot <salt|commit-hash|verify|simulate> ...");
    println!("  salt");
    println!("  commit-hash <yes|no> <salt_hex>");
    println!("  verify <yes|no> <salt_hex> <commit_hex>");
    println!("  simulate [config.json]");
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut args = env::args().skip(1);
    let command = args.next();
    let tail: Vec<String> = args.collect();
    match command.as_deref() {
        Some("salt") => cmd_salt(),
        Some("commit-hash") => cmd_commit_hash(&tail),
        Some("verify") => cmd_verify(&tail),
        Some("simulate") => cmd_simulate(&tail),
        Some("-h") | Some("--help") => print_help(),
        _ => {
            print_help();
            std::process::exit(1);
        }
    }
}

fn parse_vote(raw: &str) -> Vote {
    raw.parse()
        .unwrap_or_else(|err| fatal(&format!("invalid vote: {err}")))
}

fn parse_salt(raw: &str) -> Salt {
    Salt::from_hex(raw).unwrap_or_else(|err| fatal(&format!("invalid salt: {err}")))
}

fn cmd_salt() {
    println!("{}", OsSaltSource.generate_salt().to_hex());
}

fn cmd_commit_hash(tail: &[String]) {
    let [vote, salt] = tail else {
        fatal("Usage: ballot commit-hash <yes|no> <salt_hex>");
    };
    println!("{}", make_commit(parse_vote(vote), &parse_salt(salt)));
}

fn cmd_verify(tail: &[String]) {
    let [vote, salt, commit] = tail else {
        fatal("Usage: ballot verify <yes|no> <salt_hex> <commit_hex>");
    };
    let commit = CommitHash::from_hex(commit)
        .unwrap_or_else(|err| fatal(&format!("invalid commitment: {err}")));
    if verify_commit(parse_vote(vote), &parse_salt(salt), &commit) {
        println!("valid");
    } else {
        fatal("invalid: opening does not match commitment");
    }
}

fn cmd_simulate(tail: &[String]) {
    let config = match tail.first() {
        Some(path) => GovernanceConfig::load(Path::new(path)),
        None => GovernanceConfig::from_env(),
    }
    .unwrap_or_else(|err| fatal(&format!("config error: {err}")));

    let clock = ManualClock::new(SIMULATION_START);
    let ledger = SharedLedger::new(Ledger::new(config.ledger_params(), Arc::new(clock.clone())));
    let mut client = VotingClient::new(
        Arc::new(ledger.clone()),
        Arc::new(clock.clone()),
        Box::new(SeededSaltSource::new(SIMULATION_START)),
        &config,
    );

    let address = |n: u8| {
        VoterId::parse(&format!("0x{:040x}", n))
            .unwrap_or_else(|err| fatal(&format!("voter: {err}")))
    };
    let proposer = address(0xA0);
    let draft = ProposalDraft {
        title: "Fund security audit".into(),
        description: "External review of the treasury contracts".into(),
        amount_requested: 50_000,
        commit_duration_secs: config.min_commit_duration_secs,
        reveal_duration_secs: config.min_reveal_duration_secs,
    };
    let id = client
        .submit_proposal(&proposer, LocalId::new("simulation-1"), &draft)
        .unwrap_or_else(|err| fatal(&format!("create failed: {err}")));

    let ballots = [
        (address(1), Vote::Yes),
        (address(2), Vote::Yes),
        (address(3), Vote::No),
    ];
    for (voter, vote) in &ballots {
        client
            .commit(id, voter, *vote)
            .unwrap_or_else(|err| fatal(&format!("commit failed: {err}")));
    }
    clock.advance(draft.commit_duration_secs);
    client.poll();
    for (voter, _) in &ballots {
        client
            .reveal(id, voter)
            .unwrap_or_else(|err| fatal(&format!("reveal failed: {err}")));
    }
    clock.advance(draft.reveal_duration_secs);
    client.poll();

    let outcome = client.execute(id);
    let results = client
        .results(id)
        .unwrap_or_else(|err| fatal(&format!("results failed: {err}")));
    let outcome = match outcome {
        Ok(outcome) => json!(outcome),
        Err(err) if err.as_ledger().is_some_and(|e| e.is_protocol_outcome()) => {
            json!({ "decision": "quorum_not_met", "reason": err.to_string() })
        }
        Err(err) => fatal(&format!("execute failed: {err}")),
    };
    info!(proposal = %id, "simulation finished");

    if let Some(dir) = &config.state_dir {
        save_snapshots(&config, &ledger, &client)
            .unwrap_or_else(|err| fatal(&format!("snapshot failed: {err}")));
        info!(dir = %dir.display(), "state written");
    }

    let report = json!({
        "proposal": id,
        "results": results,
        "outcome": outcome,
    });
    match serde_json::to_string_pretty(&report) {
        Ok(text) => println!("{text}"),
        Err(err) => fatal(&format!("encode failed: {err}")),
    }
}

fn save_snapshots(
    config: &GovernanceConfig,
    ledger: &SharedLedger,
    client: &VotingClient,
) -> Result<(), String> {
    let path = |name: &str| {
        config
            .state_path(name)
            .ok_or_else(|| "state_dir is not set".to_string())
    };
    ledger
        .lock()
        .map_err(|e| e.to_string())?
        .save(&path("ledger.json")?)
        .map_err(|e| e.to_string())?;
    client
        .mirror()
        .save(&path("mirror.json")?)
        .map_err(|e| e.to_string())?;
    client
        .registry()
        .save(&path("registry.json")?)
        .map_err(|e| e.to_string())?;
    client
        .vault()
        .save(&path("salts.json")?)
        .map_err(|e| e.to_string())
}
