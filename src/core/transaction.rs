// Transaction shape only: inputs, outputs and the coinbase marker.
// Nothing here is load-bearing for consensus; blocks may carry a
// transaction as a structured payload and peers may gossip one.

use crate::error::Result;
use crate::utils::{current_timestamp, deserialize, serialize, sha256_hex};
use serde::{Deserialize, Serialize};

// Reward paid by a coinbase transaction
pub const COINBASE_REWARD: u64 = 100;
const DEFAULT_COINBASE_DATA: &str = "Coinbase Transaction";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    txid: String,
    vout: i64,
    signature: Vec<u8>,
    pub_key: Vec<u8>,
}

impl TxInput {
    pub fn new(txid: &str, vout: i64) -> TxInput {
        TxInput {
            txid: txid.to_string(),
            vout,
            signature: vec![],
            pub_key: vec![],
        }
    }

    pub fn get_txid(&self) -> &str {
        self.txid.as_str()
    }

    pub fn get_vout(&self) -> i64 {
        self.vout
    }

    pub fn get_signature(&self) -> &[u8] {
        self.signature.as_slice()
    }

    pub fn get_pub_key(&self) -> &[u8] {
        self.pub_key.as_slice()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    value: u64,
    pub_key_hash: Vec<u8>,
}

impl TxOutput {
    pub fn new(value: u64, pub_key_hash: &[u8]) -> TxOutput {
        TxOutput {
            value,
            pub_key_hash: pub_key_hash.to_vec(),
        }
    }

    pub fn get_value(&self) -> u64 {
        self.value
    }

    pub fn get_pub_key_hash(&self) -> &[u8] {
        self.pub_key_hash.as_slice()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    id: String,
    inputs: Vec<TxInput>,
    outputs: Vec<TxOutput>,
    time: i64,
}

impl Transaction {
    pub fn new(inputs: Vec<TxInput>, outputs: Vec<TxOutput>) -> Transaction {
        let mut tx = Transaction {
            id: String::new(),
            inputs,
            outputs,
            time: current_timestamp().unwrap_or_default(),
        };
        tx.id = tx.hash();
        tx
    }

    /// A transaction minting `COINBASE_REWARD` to `to`. Empty `data` gets a default marker.
    pub fn new_coinbase(to: &str, data: &str) -> Transaction {
        let data = if data.is_empty() {
            DEFAULT_COINBASE_DATA
        } else {
            data
        };
        let input = TxInput {
            txid: String::new(),
            vout: -1,
            signature: data.as_bytes().to_vec(),
            pub_key: data.as_bytes().to_vec(),
        };
        let output = TxOutput::new(COINBASE_REWARD, to.as_bytes());
        Transaction::new(vec![input], vec![output])
    }

    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].txid.is_empty() && self.inputs[0].vout == -1
    }

    /// SHA-256 over the JSON encoding with `id` cleared
    pub fn hash(&self) -> String {
        let mut copy = self.clone();
        copy.id = String::new();
        match serialize(&copy) {
            Ok(bytes) => sha256_hex(&bytes),
            Err(_) => String::new(),
        }
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Transaction> {
        deserialize(bytes)
    }

    pub fn get_id(&self) -> &str {
        self.id.as_str()
    }

    pub fn get_inputs(&self) -> &[TxInput] {
        self.inputs.as_slice()
    }

    pub fn get_outputs(&self) -> &[TxOutput] {
        self.outputs.as_slice()
    }

    pub fn get_time(&self) -> i64 {
        self.time
    }
}
