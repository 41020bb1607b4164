use std::collections::{HashMap, HashSet};
use std::fmt;

use bitcoin::{Amount, Txid};

use crate::change::{change_threshold, resolve_change};
use crate::config::EngineConfig;
use crate::error::{EngineError, SourceError};
use crate::selection::{checked_total, select_fixed, select_sweep};
use crate::source::{Broadcaster, PriceSource, SignedTransaction, Signer, UtxoSource};
use crate::types::{
    CandidateTransaction, ChangeDisposition, TransferMode, TransferRequest, TxOutput,
    UnspentOutput,
};

/// 1回の構築の進行状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStage {
    CollectingInputs,
    ResolvingChange,
    Assembled,
    Validated,
    Accepted,
    Rejected,
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuildStage::CollectingInputs => "collecting inputs",
            BuildStage::ResolvingChange => "resolving change",
            BuildStage::Assembled => "assembled",
            BuildStage::Validated => "validated",
            BuildStage::Accepted => "accepted",
            BuildStage::Rejected => "rejected",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeeSummary {
    pub fee_sats: u64,
    pub fee_usd: f64,
}

pub fn sats_to_usd(sats: u64, btc_price_usd: f64) -> f64 {
    Amount::from_sat(sats).to_btc() * btc_price_usd
}

/// 価格は有限の正の値でなければならない。NaNは手数料の範囲判定をすり抜ける
pub fn validate_price(btc_price_usd: f64) -> Result<f64, SourceError> {
    if !btc_price_usd.is_finite() || btc_price_usd <= 0.0 {
        return Err(SourceError::Malformed(format!(
            "BTC価格が不正です: {}",
            btc_price_usd
        )));
    }
    Ok(btc_price_usd)
}

/// 選択済みの入力と解決済みの出力をそのままの順序でまとめる
pub fn assemble(
    inputs: Vec<UnspentOutput>,
    outputs: Vec<TxOutput>,
    change: ChangeDisposition,
) -> CandidateTransaction {
    CandidateTransaction {
        inputs,
        outputs,
        change,
    }
}

/// 署名前の経済的な整合性チェック
///
/// 上限超過は `override_fee_ceiling` が真なら警告に格下げされる。
pub fn check_sanity(
    candidate: &CandidateTransaction,
    btc_price_usd: f64,
    config: &EngineConfig,
    override_fee_ceiling: bool,
) -> Result<FeeSummary, EngineError> {
    if let Err(e) = validate_price(btc_price_usd) {
        return Err(EngineError::InvalidRequest(e.to_string()));
    }

    let inputs = candidate.input_total();
    let outputs = candidate.output_total();
    log::debug!("SUM(inputs) = {}", inputs);
    log::debug!("SUM(outputs) = {}", outputs);

    let Some(fee_sats) = candidate.fee() else {
        return Err(EngineError::NegativeFee { inputs, outputs });
    };
    let fee_usd = sats_to_usd(fee_sats, btc_price_usd);
    log::info!("マイナー手数料 {} sats (${:.2}) を支払います", fee_sats, fee_usd);

    if fee_usd < config.min_fee_usd {
        return Err(EngineError::FeeTooSmall {
            fee_sats,
            fee_usd,
            minimum_usd: config.min_fee_usd,
        });
    }

    if fee_usd > config.max_fee_usd {
        if !override_fee_ceiling {
            return Err(EngineError::FeeTooLarge {
                fee_sats,
                fee_usd,
                maximum_usd: config.max_fee_usd,
            });
        }
        log::warn!(
            "手数料 ${:.2} は上限 ${:.2} を超えていますが、指定により続行します",
            fee_usd,
            config.max_fee_usd
        );
    }

    Ok(FeeSummary { fee_sats, fee_usd })
}

/// 送金元アドレス順にUTXOを集める。重複アドレスは最初の1回だけ、1件でも失敗したら中断
pub fn collect_utxos<S: UtxoSource + ?Sized>(
    source: &S,
    addresses: &[String],
) -> Result<Vec<UnspentOutput>, EngineError> {
    let mut seen = HashSet::new();
    let mut utxos = Vec::new();
    for address in addresses {
        if !seen.insert(address.as_str()) {
            log::debug!("重複した送金元アドレスを無視します: {}", address);
            continue;
        }
        let fetched = source
            .fetch_unspent(address)
            .map_err(|e| EngineError::UpstreamFetch {
                resource: format!("UTXO {}", address),
                source: e,
            })?;
        log::debug!("アドレス {} のUTXO {} 件を取得しました", address, fetched.len());
        utxos.extend(fetched);
    }
    Ok(utxos)
}

/// 送金リクエストから署名前のトランザクションを構築する
pub struct Engine<'a> {
    config: EngineConfig,
    utxos: &'a dyn UtxoSource,
    prices: &'a dyn PriceSource,
}

impl<'a> Engine<'a> {
    pub fn new(
        config: EngineConfig,
        utxos: &'a dyn UtxoSource,
        prices: &'a dyn PriceSource,
    ) -> Self {
        Engine {
            config,
            utxos,
            prices,
        }
    }

    pub fn build_transaction(
        &self,
        request: &TransferRequest,
    ) -> Result<CandidateTransaction, EngineError> {
        log::info!("トランザクション構築処理を開始します。");
        match self.run(request) {
            Ok(candidate) => {
                log::debug!("stage: {}", BuildStage::Accepted);
                Ok(candidate)
            }
            Err(e) => {
                log::debug!("stage: {} ({})", BuildStage::Rejected, e);
                Err(e)
            }
        }
    }

    fn run(&self, request: &TransferRequest) -> Result<CandidateTransaction, EngineError> {
        self.validate(request)?;
        let price = self
            .prices
            .fetch_price()
            .and_then(validate_price)
            .map_err(|e| EngineError::UpstreamFetch {
                resource: "BTC価格".into(),
                source: e,
            })?;

        log::debug!("stage: {}", BuildStage::CollectingInputs);
        let utxos = collect_utxos(self.utxos, &request.source_addresses)?;
        let available = checked_total(utxos.iter().map(|u| u.value))?;
        log::info!(
            "Unspent: {} addresses {} UTXOs {} sats ${:.2}",
            request.source_addresses.len(),
            utxos.len(),
            available,
            sats_to_usd(available, price)
        );
        log::debug!("手数料率 {} sat/byte を使用します", request.fee_rate);

        let model = &self.config.size_model;
        let destination = request.destination_address.as_str();
        let candidate = match request.mode {
            TransferMode::Sweep => {
                let sweep = select_sweep(utxos, request.fee_rate, model)?;
                log::info!("OUTPUT 0 Address {} Value {}", destination, sweep.send);
                assemble(
                    sweep.inputs,
                    vec![TxOutput::new(destination, sweep.send)],
                    ChangeDisposition::None,
                )
            }
            TransferMode::FixedAmount(target) => {
                let selection =
                    select_fixed(&utxos, target, request.fee_rate, request.order, model)?;
                log::info!("OUTPUT 0 Address {} Value {}", destination, target);

                log::debug!("stage: {}", BuildStage::ResolvingChange);
                let threshold_rate = self.config.threshold_rate(request.fee_rate);
                if threshold_rate != request.fee_rate {
                    log::debug!(
                        "おつり閾値は {} sat/byte で計算します (送金の手数料率は {} sat/byte)",
                        threshold_rate,
                        request.fee_rate
                    );
                }
                let threshold = change_threshold(model, threshold_rate)?;
                let resolved = resolve_change(
                    TxOutput::new(destination, target),
                    selection.change,
                    &selection.change_address,
                    threshold,
                );
                if let ChangeDisposition::Forfeited(bonus) = resolved.disposition {
                    log::warn!(
                        "Miner bonus of +{} sats +${:.2}",
                        bonus,
                        sats_to_usd(bonus, price)
                    );
                }
                assemble(selection.inputs, resolved.outputs, resolved.disposition)
            }
        };
        log::debug!("stage: {}", BuildStage::Assembled);

        check_sanity(&candidate, price, &self.config, request.override_fee_ceiling)?;
        log::debug!("stage: {}", BuildStage::Validated);
        Ok(candidate)
    }

    fn validate(&self, request: &TransferRequest) -> Result<(), EngineError> {
        if request.destination_address.trim().is_empty() {
            return Err(EngineError::InvalidRequest("送金先アドレスが空です".into()));
        }
        if request.source_addresses.is_empty() {
            return Err(EngineError::InvalidRequest(
                "送金元アドレスが指定されていません".into(),
            ));
        }
        if request.fee_rate > self.config.max_fee_rate {
            return Err(EngineError::InvalidRequest(format!(
                "手数料率は 0 から {} sat/byte の範囲で指定してください: {}",
                self.config.max_fee_rate, request.fee_rate
            )));
        }
        if request.mode == TransferMode::FixedAmount(0) {
            return Err(EngineError::InvalidRequest("送金額が 0 です".into()));
        }
        Ok(())
    }
}

/// 承認済みの候補トランザクションの全入力に署名し、ブロードキャストする
///
/// 全入力の署名が揃うまでブロードキャストは行わない。
pub fn sign_and_broadcast(
    candidate: CandidateTransaction,
    keys: &HashMap<String, String>,
    signer: &dyn Signer,
    broadcaster: &dyn Broadcaster,
) -> Result<Txid, EngineError> {
    let mut signed_inputs = Vec::with_capacity(candidate.inputs.len());
    for (input_index, input) in candidate.inputs.iter().enumerate() {
        let key = keys
            .get(&input.owning_address)
            .ok_or_else(|| EngineError::MissingKey {
                address: input.owning_address.clone(),
            })?;
        log::debug!("入力 {} に署名します", input_index);
        let fragment = signer
            .sign(&candidate, input_index, key)
            .map_err(|e| EngineError::Signing {
                input_index,
                source: e,
            })?;
        signed_inputs.push(fragment);
    }

    let signed = SignedTransaction {
        candidate,
        inputs: signed_inputs,
    };
    let txid = broadcaster
        .broadcast(&signed)
        .map_err(EngineError::Broadcast)?;
    log::info!("トランザクション {} をネットワークに送信しました", txid);
    Ok(txid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use bitcoin::OutPoint;
    use bitcoin::hashes::Hash;
    use std::cell::RefCell;

    fn make_utxo(address: &str, vout: u32, value: u64) -> UnspentOutput {
        UnspentOutput {
            output_ref: OutPoint::new(Txid::all_zeros(), vout),
            owning_address: address.to_string(),
            value,
        }
    }

    fn candidate(inputs: &[u64], outputs: &[u64]) -> CandidateTransaction {
        assemble(
            inputs
                .iter()
                .enumerate()
                .map(|(i, v)| make_utxo("1src", i as u32, *v))
                .collect(),
            outputs.iter().map(|v| TxOutput::new("1dest", *v)).collect(),
            ChangeDisposition::None,
        )
    }

    struct Book(Vec<UnspentOutput>);

    impl UtxoSource for Book {
        fn fetch_unspent(&self, address: &str) -> Result<Vec<UnspentOutput>, SourceError> {
            if address == "1broken" {
                return Err(SourceError::Unavailable("503".into()));
            }
            Ok(self
                .0
                .iter()
                .filter(|u| u.owning_address == address)
                .cloned()
                .collect())
        }
    }

    #[test]
    fn assemble_preserves_order() {
        let tx = assemble(
            vec![make_utxo("1b", 0, 5), make_utxo("1a", 1, 9)],
            vec![TxOutput::new("1dest", 10), TxOutput::new("1b", 2)],
            ChangeDisposition::Output(2),
        );
        assert_eq!(tx.inputs[0].owning_address, "1b");
        assert_eq!(tx.outputs[0].address, "1dest");
        assert_eq!(tx.outputs[1].address, "1b");
    }

    #[test]
    fn sanity_rejects_negative_fee() {
        let tx = candidate(&[1_000], &[2_000]);
        let err = check_sanity(&tx, 50_000.0, &EngineConfig::default(), false).unwrap_err();
        assert!(matches!(err, EngineError::NegativeFee { inputs: 1_000, outputs: 2_000 }));
    }

    #[test]
    fn sanity_rejects_tiny_fee() {
        // 10 sats at $50,000 = $0.005
        let tx = candidate(&[100_010], &[100_000]);
        let err = check_sanity(&tx, 50_000.0, &EngineConfig::default(), false).unwrap_err();
        assert!(matches!(err, EngineError::FeeTooSmall { fee_sats: 10, .. }));
    }

    #[test]
    fn sanity_rejects_huge_fee_unless_overridden() {
        // 20,000 sats at $50,000 = $10
        let tx = candidate(&[120_000], &[100_000]);
        let cfg = EngineConfig::default();
        let err = check_sanity(&tx, 50_000.0, &cfg, false).unwrap_err();
        assert!(matches!(err, EngineError::FeeTooLarge { fee_sats: 20_000, .. }));

        let summary = check_sanity(&tx, 50_000.0, &cfg, true).unwrap();
        assert_eq!(summary.fee_sats, 20_000);
        assert!((summary.fee_usd - 10.0).abs() < 1e-9);
    }

    #[test]
    fn sanity_accepts_fee_in_band() {
        let tx = candidate(&[105_000], &[100_000]);
        let summary = check_sanity(&tx, 50_000.0, &EngineConfig::default(), false).unwrap();
        assert_eq!(summary.fee_sats, 5_000);
    }

    #[test]
    fn sanity_rejects_unusable_price() {
        // $36.88 at a sane price, far above the $5 ceiling
        let tx = candidate(&[1_000_000], &[815_600]);
        let cfg = EngineConfig::default();
        for price in [f64::NAN, f64::INFINITY, 0.0, -20_000.0] {
            let err = check_sanity(&tx, price, &cfg, false).unwrap_err();
            assert!(matches!(err, EngineError::InvalidRequest(_)), "price {price}");
        }
    }

    #[test]
    fn validate_price_accepts_positive_finite() {
        assert_eq!(validate_price(20_000.0), Ok(20_000.0));
        assert!(matches!(validate_price(f64::NAN), Err(SourceError::Malformed(_))));
    }

    #[test]
    fn collect_keeps_address_order_and_skips_duplicates() {
        let book = Book(vec![
            make_utxo("1a", 0, 1),
            make_utxo("1b", 1, 2),
            make_utxo("1a", 2, 3),
        ]);
        let addrs = vec!["1b".to_string(), "1a".to_string(), "1b".to_string()];
        let utxos = collect_utxos(&book, &addrs).unwrap();
        let values: Vec<u64> = utxos.iter().map(|u| u.value).collect();
        assert_eq!(values, vec![2, 1, 3]);
    }

    #[test]
    fn collect_fails_fast() {
        let book = Book(vec![make_utxo("1a", 0, 1)]);
        let addrs = vec!["1a".to_string(), "1broken".to_string()];
        let err = collect_utxos(&book, &addrs).unwrap_err();
        match err {
            EngineError::UpstreamFetch { resource, .. } => assert!(resource.contains("1broken")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    struct RecordingSigner {
        fail_at: Option<usize>,
        calls: RefCell<Vec<(usize, String)>>,
    }

    impl Signer for RecordingSigner {
        fn sign(
            &self,
            _candidate: &CandidateTransaction,
            input_index: usize,
            private_key: &str,
        ) -> Result<crate::source::SignedInput, SourceError> {
            self.calls.borrow_mut().push((input_index, private_key.to_string()));
            if self.fail_at == Some(input_index) {
                return Err(SourceError::Rejected("bad key".into()));
            }
            Ok(crate::source::SignedInput(vec![input_index as u8]))
        }
    }

    struct CountingBroadcaster(RefCell<usize>);

    impl Broadcaster for CountingBroadcaster {
        fn broadcast(&self, signed: &SignedTransaction) -> Result<Txid, SourceError> {
            *self.0.borrow_mut() += 1;
            assert_eq!(signed.inputs.len(), signed.candidate.inputs.len());
            Ok(Txid::all_zeros())
        }
    }

    fn keys() -> HashMap<String, String> {
        HashMap::from([
            ("1a".to_string(), "key-a".to_string()),
            ("1b".to_string(), "key-b".to_string()),
        ])
    }

    #[test]
    fn signs_each_input_with_owner_key() {
        let tx = assemble(
            vec![make_utxo("1a", 0, 60_000), make_utxo("1b", 1, 50_000)],
            vec![TxOutput::new("1dest", 100_000)],
            ChangeDisposition::None,
        );
        let signer = RecordingSigner { fail_at: None, calls: RefCell::new(Vec::new()) };
        let bc = CountingBroadcaster(RefCell::new(0));
        let txid = sign_and_broadcast(tx, &keys(), &signer, &bc).unwrap();
        assert_eq!(txid, Txid::all_zeros());
        assert_eq!(
            *signer.calls.borrow(),
            vec![(0, "key-a".to_string()), (1, "key-b".to_string())]
        );
        assert_eq!(*bc.0.borrow(), 1);
    }

    #[test]
    fn signing_failure_prevents_broadcast() {
        let tx = assemble(
            vec![make_utxo("1a", 0, 60_000), make_utxo("1b", 1, 50_000)],
            vec![TxOutput::new("1dest", 100_000)],
            ChangeDisposition::None,
        );
        let signer = RecordingSigner { fail_at: Some(1), calls: RefCell::new(Vec::new()) };
        let bc = CountingBroadcaster(RefCell::new(0));
        let err = sign_and_broadcast(tx, &keys(), &signer, &bc).unwrap_err();
        assert!(matches!(err, EngineError::Signing { input_index: 1, .. }));
        assert_eq!(*bc.0.borrow(), 0);
    }

    #[test]
    fn missing_key_prevents_signing() {
        let tx = assemble(
            vec![make_utxo("1c", 0, 60_000)],
            vec![TxOutput::new("1dest", 50_000)],
            ChangeDisposition::None,
        );
        let signer = RecordingSigner { fail_at: None, calls: RefCell::new(Vec::new()) };
        let bc = CountingBroadcaster(RefCell::new(0));
        let err = sign_and_broadcast(tx, &keys(), &signer, &bc).unwrap_err();
        assert!(matches!(err, EngineError::MissingKey { ref address } if address == "1c"));
        assert!(signer.calls.borrow().is_empty());
    }
}
