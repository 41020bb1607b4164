use bitcoin::OutPoint;
use serde::Serialize;

/// 確認済みで使用可能な未使用出力
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnspentOutput {
    pub output_ref: OutPoint,
    pub owning_address: String,
    pub value: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TxOutput {
    pub address: String,
    pub value: u64,
}

impl TxOutput {
    pub fn new(address: impl Into<String>, value: u64) -> Self {
        TxOutput {
            address: address.into(),
            value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    /// 全UTXOを単一出力へ
    Sweep,
    FixedAmount(u64),
}

/// 固定額送金時のUTXO消費順
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionOrder {
    /// 金額の大きい順。入力数と手数料を抑える
    #[default]
    LargestFirst,
    /// 金額の小さい順。残るUTXOの数を減らす
    SmallestFirst,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferRequest {
    pub destination_address: String,
    pub mode: TransferMode,
    /// sat/byte
    pub fee_rate: u64,
    pub source_addresses: Vec<String>,
    pub order: SelectionOrder,
    /// 手数料上限超過をエラーではなく警告として扱う
    pub override_fee_ceiling: bool,
}

impl TransferRequest {
    pub fn sweep(destination: impl Into<String>, sources: Vec<String>, fee_rate: u64) -> Self {
        TransferRequest {
            destination_address: destination.into(),
            mode: TransferMode::Sweep,
            fee_rate,
            source_addresses: sources,
            order: SelectionOrder::default(),
            override_fee_ceiling: false,
        }
    }

    pub fn fixed(
        destination: impl Into<String>,
        amount: u64,
        sources: Vec<String>,
        fee_rate: u64,
    ) -> Self {
        TransferRequest {
            destination_address: destination.into(),
            mode: TransferMode::FixedAmount(amount),
            fee_rate,
            source_addresses: sources,
            order: SelectionOrder::default(),
            override_fee_ceiling: false,
        }
    }
}

/// おつりの処理結果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum ChangeDisposition {
    None,
    /// 使うほうが高くつくためマイナーに譲った額
    Forfeited(u64),
    /// 送金先と同じアドレスのため送金出力に合算した額
    Merged(u64),
    /// おつり出力として追加した額
    Output(u64),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateTransaction {
    pub inputs: Vec<UnspentOutput>,
    pub outputs: Vec<TxOutput>,
    pub change: ChangeDisposition,
}

impl CandidateTransaction {
    pub fn input_total(&self) -> u64 {
        self.inputs.iter().map(|u| u.value).sum()
    }

    pub fn output_total(&self) -> u64 {
        self.outputs.iter().map(|o| o.value).sum()
    }

    /// 入力合計 - 出力合計。出力が上回る場合は None
    pub fn fee(&self) -> Option<u64> {
        self.input_total().checked_sub(self.output_total())
    }
}
