use crate::error::{EngineError, Shortfall};
use crate::fee::{SizeModel, estimate_fee};
use crate::types::{SelectionOrder, UnspentOutput};

/// 固定額送金の選択結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub inputs: Vec<UnspentOutput>,
    /// 入力数に応じて積み上げた手数料
    pub fee: u64,
    /// target + fee を超えた分
    pub change: u64,
    /// 最後に消費したUTXOの所有アドレス
    pub change_address: String,
}

/// スイープの選択結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepSelection {
    pub inputs: Vec<UnspentOutput>,
    pub fee: u64,
    /// 単一出力の金額
    pub send: u64,
}

/// 全UTXOを取得順のまま消費する。手数料は入力数n・出力1で一度だけ計算する
pub fn select_sweep(
    utxos: Vec<UnspentOutput>,
    fee_rate: u64,
    model: &SizeModel,
) -> Result<SweepSelection, EngineError> {
    let fee = estimate_fee(model.estimated_size(utxos.len(), 1), fee_rate)?;
    let available = checked_total(utxos.iter().map(|u| u.value))?;
    log::warn!("全UTXOから {} sats をスイープします", available);

    if utxos.is_empty() || available < fee {
        return Err(EngineError::InsufficientFunds {
            required: fee,
            available,
            fee,
            kind: if utxos.is_empty() {
                Shortfall::Principal
            } else {
                Shortfall::AfterFees
            },
        });
    }

    let mut total = 0u64;
    for (n, utxo) in utxos.iter().enumerate() {
        total += utxo.value;
        log::info!(
            "Input {} UTXO {} Value {} Total {}",
            n,
            utxo.output_ref,
            utxo.value,
            total
        );
    }

    Ok(SweepSelection {
        inputs: utxos,
        fee,
        send: available - fee,
    })
}

/// `order` の順にUTXOを消費し、target と積み上げ手数料を満たした時点で止める
///
/// 手数料は送金先とおつりの2出力を前提に始まり、入力を1つ消費するごとに
/// `per_input * fee_rate` だけ増える。同額のUTXOは取得順を保つ。
pub fn select_fixed(
    utxos: &[UnspentOutput],
    target: u64,
    fee_rate: u64,
    order: SelectionOrder,
    model: &SizeModel,
) -> Result<Selection, EngineError> {
    let mut ordered: Vec<&UnspentOutput> = utxos.iter().collect();
    match order {
        SelectionOrder::LargestFirst => ordered.sort_by(|a, b| b.value.cmp(&a.value)),
        SelectionOrder::SmallestFirst => ordered.sort_by_key(|u| u.value),
    }

    let fee_increment = estimate_fee(model.per_input, fee_rate)?;
    let mut fee = estimate_fee(model.estimated_size(0, 2), fee_rate)?;
    let mut total = 0u64;
    let mut selected: Vec<UnspentOutput> = Vec::new();

    log::info!("{} sats を送金します", target);

    for utxo in ordered {
        fee = checked_add(fee, fee_increment)?;
        total = checked_add(total, utxo.value)?;
        selected.push(utxo.clone());
        log::info!(
            "Input {} UTXO {} Value {} Total {}",
            selected.len() - 1,
            utxo.output_ref,
            utxo.value,
            total
        );

        let required = checked_add(target, fee)?;
        if total >= required {
            return Ok(Selection {
                inputs: selected,
                fee,
                change: total - required,
                change_address: utxo.owning_address.clone(),
            });
        }
    }

    let required = checked_add(target, fee)?;
    let kind = if total < target {
        Shortfall::Principal
    } else {
        Shortfall::AfterFees
    };
    Err(EngineError::InsufficientFunds {
        required,
        available: total,
        fee,
        kind,
    })
}

/// 金額の合計。オーバーフローは不正なリクエストとして扱う
pub fn checked_total<I: IntoIterator<Item = u64>>(values: I) -> Result<u64, EngineError> {
    values.into_iter().try_fold(0u64, checked_add)
}

fn checked_add(a: u64, b: u64) -> Result<u64, EngineError> {
    a.checked_add(b)
        .ok_or_else(|| EngineError::InvalidRequest(format!("金額がオーバーフローしました: {} + {}", a, b)))
}
