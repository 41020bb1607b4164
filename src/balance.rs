use std::fmt::Write;

use bitcoin::Amount;

use crate::config::WalletEntry;
use crate::error::EngineError;
use crate::source::UtxoSource;
use crate::transaction::sats_to_usd;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceRow {
    pub name: String,
    pub address: String,
    pub sats: u64,
    pub watch_only: bool,
}

/// 各エントリの確認済み残高を求める。1件でも取得に失敗したら中断
pub fn fetch_balances<S: UtxoSource + ?Sized>(
    source: &S,
    entries: &[WalletEntry],
) -> Result<Vec<BalanceRow>, EngineError> {
    entries
        .iter()
        .map(|e| {
            let utxos = source
                .fetch_unspent(&e.address)
                .map_err(|err| EngineError::UpstreamFetch {
                    resource: format!("残高 {}", e.address),
                    source: err,
                })?;
            let sats = utxos.iter().map(|u| u.value).sum();
            log::debug!("アドレス {} の残高は {} sats", e.address, sats);
            Ok(BalanceRow {
                name: e.name.clone(),
                address: e.address.clone(),
                sats,
                watch_only: e.privkey.is_none(),
            })
        })
        .collect()
}

/// 名前・アドレス・BTC・USDの表を作る
///
/// `single` が偽のときは合計行を付け、残高ゼロと監視専用の行は
/// `show_all` が真の場合だけ表示する。
pub fn render_report(
    rows: &[BalanceRow],
    btc_price_usd: f64,
    show_all: bool,
    single: bool,
) -> String {
    let mut rpt = String::new();
    let _ = writeln!(rpt);
    let _ = writeln!(rpt, "{:<32} {:<40} {:>12} {:>12}", "Name", "Address", "BTC", "USD");
    let _ = writeln!(rpt);

    let mut total = 0u64;
    for row in rows {
        if row.watch_only && !show_all && !single {
            continue;
        }
        total += row.sats;
        if row.sats > 0 || show_all || single {
            let _ = writeln!(
                rpt,
                "{:<32} {:<40} {:>12.8} {:>12.2}",
                row.name,
                row.address,
                Amount::from_sat(row.sats).to_btc(),
                sats_to_usd(row.sats, btc_price_usd)
            );
        }
    }

    if !single {
        let _ = writeln!(rpt);
        let _ = writeln!(
            rpt,
            "{:<32} {:<40} {:>12.8} {:>12.2}",
            "",
            "Total",
            Amount::from_sat(total).to_btc(),
            sats_to_usd(total, btc_price_usd)
        );
    }
    let _ = writeln!(rpt);
    rpt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use crate::types::UnspentOutput;
    use bitcoin::hashes::Hash;
    use bitcoin::{OutPoint, Txid};

    struct Fixed;

    impl UtxoSource for Fixed {
        fn fetch_unspent(&self, address: &str) -> Result<Vec<UnspentOutput>, SourceError> {
            let value = match address {
                "1rich" => 150_000_000,
                "1empty" => return Ok(Vec::new()),
                _ => return Err(SourceError::Unavailable("down".into())),
            };
            Ok(vec![UnspentOutput {
                output_ref: OutPoint::new(Txid::all_zeros(), 0),
                owning_address: address.into(),
                value,
            }])
        }
    }

    fn entry(name: &str, address: &str, privkey: Option<&str>) -> WalletEntry {
        WalletEntry {
            name: name.into(),
            address: address.into(),
            privkey: privkey.map(str::to_string),
            utxos: Vec::new(),
        }
    }

    fn row(name: &str, sats: u64, watch_only: bool) -> BalanceRow {
        BalanceRow {
            name: name.into(),
            address: format!("1{name}"),
            sats,
            watch_only,
        }
    }

    #[test]
    fn balances_sum_outputs() {
        let rows = fetch_balances(
            &Fixed,
            &[entry("rich", "1rich", Some("k")), entry("empty", "1empty", None)],
        )
        .unwrap();
        assert_eq!(rows[0].sats, 150_000_000);
        assert_eq!(rows[1].sats, 0);
        assert!(rows[1].watch_only);
    }

    #[test]
    fn balance_fetch_failure_aborts() {
        let err = fetch_balances(&Fixed, &[entry("x", "1broken", None)]).unwrap_err();
        assert!(matches!(err, EngineError::UpstreamFetch { .. }));
    }

    #[test]
    fn report_hides_zero_and_watch_only_rows() {
        let rows = vec![
            row("rich", 150_000_000, false),
            row("empty", 0, false),
            row("cold", 5, true),
        ];
        let rpt = render_report(&rows, 20_000.0, false, false);
        assert!(rpt.contains("rich"));
        assert!(rpt.contains("1.50000000"));
        assert!(rpt.contains("30000.00"));
        assert!(!rpt.contains("empty"));
        assert!(!rpt.contains("cold"));
        assert!(rpt.contains("Total"));
    }

    #[test]
    fn report_show_all_includes_everything() {
        let rows = vec![row("empty", 0, false), row("cold", 5, true)];
        let rpt = render_report(&rows, 20_000.0, true, false);
        assert!(rpt.contains("empty"));
        assert!(rpt.contains("cold"));
    }

    #[test]
    fn single_report_has_no_total() {
        let rpt = render_report(&[row("cold", 0, true)], 20_000.0, false, true);
        assert!(rpt.contains("cold"));
        assert!(!rpt.contains("Total"));
    }
}
