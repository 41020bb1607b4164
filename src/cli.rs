use std::path::PathBuf;

use bitcoin::{Amount, Denomination};
use clap::{Args, Parser, Subcommand, ValueEnum};

use btc_sweep::SelectionOrder;
use btc_sweep::config::DEFAULT_FEE_PER_BYTE;
use btc_sweep::error::AppError;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct CliArgs {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// 送金トランザクションを構築する (--amount 省略時はスイープ)
    Send(SendArgs),
    /// アドレスごとの残高を表示する
    Balance(BalanceArgs),
    /// 目標ブロック数に対する手数料率を表示する
    Fee(FeeArgs),
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// ウォレット情報を記述したJSONファイルへのパス
    #[clap(short, long, value_parser)]
    pub input_file: PathBuf,

    /// 送金元 (名前またはアドレスの部分文字列、複数可)
    #[clap(short, long = "from", num_args = 1.., required = true)]
    pub from: Vec<String>,

    /// 送金先アドレス
    #[clap(short, long)]
    pub to: String,

    /// 送金額 (BTC)
    #[clap(short, long)]
    pub amount: Option<String>,

    /// 手数料率 (sat/byte)
    #[clap(short = 'm', long, conflicts_with = "block_target")]
    pub fee: Option<u64>,

    /// 手数料率を入力ファイルの目標ブロック数から決める
    #[clap(short, long)]
    pub block_target: Option<u32>,

    #[clap(long, value_enum, default_value_t = OrderArg::LargestFirst)]
    pub order: OrderArg,

    /// 手数料上限を超えても続行する
    #[clap(long)]
    pub allow_high_fee: bool,

    /// 構築したトランザクションのJSONを保存するファイルへのパス
    #[clap(short, long, value_parser)]
    pub output_file: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct BalanceArgs {
    #[clap(short, long, value_parser)]
    pub input_file: PathBuf,

    /// このアドレスだけ表示する (名前またはアドレスの部分文字列)
    #[clap(short, long = "from")]
    pub from: Option<String>,

    /// 残高ゼロと監視専用のアドレスも表示する
    #[clap(short = 'a', long)]
    pub show_all: bool,
}

#[derive(Args, Debug)]
pub struct FeeArgs {
    #[clap(short, long, value_parser)]
    pub input_file: PathBuf,

    #[clap(short, long, default_value_t = 2)]
    pub block_target: u32,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderArg {
    LargestFirst,
    SmallestFirst,
}

impl From<OrderArg> for SelectionOrder {
    fn from(o: OrderArg) -> Self {
        match o {
            OrderArg::LargestFirst => SelectionOrder::LargestFirst,
            OrderArg::SmallestFirst => SelectionOrder::SmallestFirst,
        }
    }
}

pub fn parse_amount(amount_str: &str) -> Result<u64, AppError> {
    Amount::from_str_in(amount_str.trim(), Denomination::Bitcoin)
        .map(|a| a.to_sat())
        .map_err(|e| AppError::InputValidation(format!("無効な送金額が指定されました ({}): {}", amount_str, e)))
}

/// --fee と --block-target のどちらも無い場合の手数料率
pub fn default_fee_rate() -> u64 {
    DEFAULT_FEE_PER_BYTE
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amount_is_parsed_as_btc() {
        assert_eq!(parse_amount("0.01").unwrap(), 1_000_000);
        assert_eq!(parse_amount(" 1 ").unwrap(), 100_000_000);
    }

    #[test]
    fn invalid_amounts_are_rejected() {
        assert!(parse_amount("-0.5").is_err());
        assert!(parse_amount("abc").is_err());
        assert!(parse_amount("0.000000001").is_err());
    }

    #[test]
    fn send_args_parse() {
        let args = CliArgs::try_parse_from([
            "btc-sweep-cli", "send", "-i", "w.json", "--from", "alpha", "beta", "--to", "1dest",
            "--amount", "0.5", "--order", "smallest-first",
        ])
        .unwrap();
        let Command::Send(send) = args.command else {
            panic!("expected send");
        };
        assert_eq!(send.from, vec!["alpha", "beta"]);
        assert_eq!(send.order, OrderArg::SmallestFirst);
        assert_eq!(send.fee, None);
        assert!(!send.allow_high_fee);
    }

    #[test]
    fn fee_and_block_target_conflict() {
        let res = CliArgs::try_parse_from([
            "btc-sweep-cli", "send", "-i", "w.json", "--from", "alpha", "--to", "1dest",
            "--fee", "10", "--block-target", "2",
        ]);
        assert!(res.is_err());
    }
}
