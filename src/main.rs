use std::fs::File;
use std::io::Write;

use clap::Parser;

use btc_sweep::balance::{fetch_balances, render_report};
use btc_sweep::config::InputConfig;
use btc_sweep::error::AppError;
use btc_sweep::fee::resolve_fee_rate;
use btc_sweep::source::{PriceSource, StaticLedger};
use btc_sweep::wallet::AddressBook;
use btc_sweep::{Engine, EngineError, TransferMode, TransferRequest};

mod cli;

use cli::{BalanceArgs, CliArgs, Command, FeeArgs, SendArgs, default_fee_rate, parse_amount};

fn main() -> Result<(), AppError> {
    env_logger::init();

    let args = CliArgs::parse();
    log::info!("アプリケーションを開始します。引数: {:?}", args);

    let result = match args.command {
        Command::Send(send) => run_send(send),
        Command::Balance(balance) => run_balance(balance),
        Command::Fee(fee) => run_fee(fee),
    };
    if let Err(e) = &result {
        log::error!("{}", e);
    }
    result
}

fn load_ledger(input: &InputConfig) -> Result<StaticLedger, AppError> {
    StaticLedger::from_config(input).map_err(|e| {
        AppError::Engine(EngineError::UpstreamFetch {
            resource: "入力ファイルのUTXO".into(),
            source: e,
        })
    })
}

fn run_send(args: SendArgs) -> Result<(), AppError> {
    let input = InputConfig::load(&args.input_file)?;
    let ledger = load_ledger(&input)?;
    let book = AddressBook::new(input.wallet.clone());

    let mut sources = Vec::with_capacity(args.from.len());
    for query in &args.from {
        let entry = book
            .lookup(query)
            .ok_or_else(|| AppError::UnknownAddress(query.clone()))?;
        log::debug!("送金元 \"{}\" -> {} ({})", query, entry.name, entry.address);
        sources.push(entry.address.clone());
    }
    let keys = book.require_keys(&sources)?;
    log::debug!("送金元の秘密鍵 {} 件を確認しました", keys.len());

    let fee_rate = match (args.fee, args.block_target) {
        (Some(rate), _) => rate,
        (None, Some(target)) => resolve_fee_rate(&ledger, target)?.rate,
        (None, None) => default_fee_rate(),
    };

    let mode = match &args.amount {
        Some(amount) => TransferMode::FixedAmount(parse_amount(amount)?),
        None => TransferMode::Sweep,
    };

    let request = TransferRequest {
        destination_address: args.to.clone(),
        mode,
        fee_rate,
        source_addresses: sources,
        order: args.order.into(),
        override_fee_ceiling: args.allow_high_fee,
    };

    let engine = Engine::new(input.engine.clone(), &ledger, &ledger);
    let candidate = engine.build_transaction(&request)?;
    log::info!(
        "トランザクションの構築に成功しました: 入力 {} 件, 出力 {} 件",
        candidate.inputs.len(),
        candidate.outputs.len()
    );

    let json = serde_json::to_string_pretty(&candidate).map_err(AppError::JsonWrite)?;
    println!("{}", json);

    if let Some(path) = &args.output_file {
        let mut output_file = File::create(path).map_err(|e| {
            log::error!("出力ファイルの作成に失敗しました: {:?}", path);
            AppError::Io(e)
        })?;
        output_file.write_all(json.as_bytes())?;
        log::info!("トランザクションを {:?} に保存しました。", path);
    }
    Ok(())
}

fn run_balance(args: BalanceArgs) -> Result<(), AppError> {
    let input = InputConfig::load(&args.input_file)?;
    let ledger = load_ledger(&input)?;
    let book = AddressBook::new(input.wallet.clone());

    let (entries, single) = match &args.from {
        Some(query) => {
            let entry = book
                .lookup(query)
                .ok_or_else(|| AppError::UnknownAddress(query.clone()))?;
            (vec![entry.clone()], true)
        }
        None => (book.entries().to_vec(), false),
    };

    let price = ledger.fetch_price().map_err(|e| {
        AppError::Engine(EngineError::UpstreamFetch {
            resource: "BTC価格".into(),
            source: e,
        })
    })?;
    let rows = fetch_balances(&ledger, &entries)?;
    print!("{}", render_report(&rows, price, args.show_all, single));
    Ok(())
}

fn run_fee(args: FeeArgs) -> Result<(), AppError> {
    let input = InputConfig::load(&args.input_file)?;
    let ledger = load_ledger(&input)?;
    let envelope = resolve_fee_rate(&ledger, args.block_target)?;
    println!(
        "fee for confirmation in {} blocks: {} sat/byte",
        envelope.confirmation_target, envelope.rate
    );
    Ok(())
}
