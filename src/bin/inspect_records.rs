//! Record database inspector
//!
//! Dumps profiles, games, the active-game index, and ledger rows so a
//! stopped table can be examined without the server running.

use clap::Parser;
use pontoon::game::cards::Card;
use pontoon::game::engine::GameRecord;
use pontoon::record_store::{LedgerEntry, PlayerProfile};
use pontoon::storage::Storage;
use std::path::Path;

#[derive(Parser, Debug)]
#[command(name = "inspect_records")]
#[command(about = "Dump pontoon records from a database directory", long_about = None)]
struct Args {
    /// Database directory
    #[arg(long, default_value = "./DB/pontoon_data")]
    db_path: String,

    /// Maximum rows to print per section
    #[arg(long, default_value = "20")]
    limit: usize,
}

fn main() {
    let args = Args::parse();

    if !Path::new(&args.db_path).exists() {
        println!("❌ No record data found at {}", args.db_path);
        return;
    }

    let storage = Storage::open_at_path(&args.db_path).expect("Failed to open database");

    println!("🔍 Pontoon Record Inspector");
    println!("===========================");
    println!("Database: {}\n", args.db_path);

    println!("👤 Player Profiles:");
    match storage.scan_prefix(b"user:profile:") {
        Ok(rows) => {
            for (key, value) in rows.iter().take(args.limit) {
                match serde_json::from_slice::<PlayerProfile>(value) {
                    Ok(p) => println!(
                        "   {} balance={} wagered={} w/l/p={}/{}/{} bought={} version={}",
                        p.user_id,
                        p.balance,
                        p.total_wagered,
                        p.total_wins,
                        p.total_losses,
                        p.total_pushes,
                        p.total_chips_bought,
                        p.version
                    ),
                    Err(e) => println!("   ❌ {}: {}", String::from_utf8_lossy(key), e),
                }
            }
            println!("   ({} profiles total)\n", rows.len());
        }
        Err(e) => println!("   ❌ Scan failed: {}\n", e),
    }

    println!("🎯 Active Game Index:");
    match storage.scan_prefix(b"user:active:") {
        Ok(rows) => {
            for (key, value) in rows.iter().take(args.limit) {
                let user = String::from_utf8_lossy(key);
                let user = user.trim_start_matches("user:active:");
                println!("   {} -> {}", user, String::from_utf8_lossy(value));
            }
            println!("   ({} live pointers)\n", rows.len());
        }
        Err(e) => println!("   ❌ Scan failed: {}\n", e),
    }

    println!("🃏 Games:");
    match storage.scan_prefix(b"game:") {
        Ok(rows) => {
            for (key, value) in rows.iter().take(args.limit) {
                match serde_json::from_slice::<GameRecord>(value) {
                    Ok(game) => {
                        let result = game
                            .result
                            .map(|r| r.to_string())
                            .unwrap_or_else(|| "-".to_string());
                        println!(
                            "   {} owner={} bet={} status={} result={} player=[{}]({}) dealer=[{}]({})",
                            game.id,
                            game.owner_id,
                            game.bet_amount,
                            game.status,
                            result,
                            hand(&game.player_hand),
                            game.player_value().total,
                            hand(&game.dealer_hand),
                            game.dealer_value().total
                        );
                    }
                    Err(e) => println!("   ❌ {}: {}", String::from_utf8_lossy(key), e),
                }
            }
            println!("   ({} games total)\n", rows.len());
        }
        Err(e) => println!("   ❌ Scan failed: {}\n", e),
    }

    println!("📒 Ledger Entries:");
    match storage.scan_prefix(b"ledger:entry:") {
        Ok(rows) => {
            for (key, value) in rows.iter().take(args.limit) {
                match serde_json::from_slice::<LedgerEntry>(value) {
                    Ok(entry) => println!(
                        "   {} {} {:?} amount={} balance {} -> {} game={}",
                        entry.created_at.format("%Y-%m-%d %H:%M:%S"),
                        entry.owner_id,
                        entry.entry_type,
                        entry.amount,
                        entry.balance_before,
                        entry.balance_after,
                        entry.game_id
                    ),
                    Err(e) => println!("   ❌ {}: {}", String::from_utf8_lossy(key), e),
                }
            }
            println!("   ({} entries total)", rows.len());
        }
        Err(e) => println!("   ❌ Scan failed: {}", e),
    }
}

fn hand(cards: &[Card]) -> String {
    cards
        .iter()
        .map(|card| {
            if card.face_down {
                "??".to_string()
            } else {
                card.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
