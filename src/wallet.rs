use std::collections::HashMap;

use crate::config::WalletEntry;
use crate::error::EngineError;

/// 名前・アドレス・秘密鍵の一覧
#[derive(Debug, Clone, Default)]
pub struct AddressBook {
    entries: Vec<WalletEntry>,
}

impl AddressBook {
    pub fn new(entries: Vec<WalletEntry>) -> Self {
        AddressBook { entries }
    }

    pub fn entries(&self) -> &[WalletEntry] {
        &self.entries
    }

    /// 名前またはアドレスに大文字小文字を区別せず部分一致する最初のエントリ
    pub fn lookup(&self, query: &str) -> Option<&WalletEntry> {
        let needle = query.to_lowercase();
        if needle.is_empty() {
            return None;
        }
        self.entries.iter().find(|e| {
            e.name.to_lowercase().contains(&needle) || e.address.to_lowercase().contains(&needle)
        })
    }

    /// アドレス -> 秘密鍵。監視専用のエントリは含まない
    pub fn keys(&self) -> HashMap<String, String> {
        self.entries
            .iter()
            .filter_map(|e| e.privkey.clone().map(|k| (e.address.clone(), k)))
            .collect()
    }

    /// 送金元ごとの秘密鍵。鍵のないアドレスが1つでもあれば失敗する
    pub fn require_keys(
        &self,
        addresses: &[String],
    ) -> Result<HashMap<String, String>, EngineError> {
        let mut keys = self.keys();
        let mut selected = HashMap::with_capacity(addresses.len());
        for address in addresses {
            let key = keys.remove(address).or_else(|| selected.get(address).cloned());
            let Some(key) = key else {
                return Err(EngineError::MissingKey {
                    address: address.clone(),
                });
            };
            selected.insert(address.clone(), key);
        }
        Ok(selected)
    }
}
