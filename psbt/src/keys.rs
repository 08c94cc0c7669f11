// Modern, minimalistic & standard-compliant cold wallet library.
//
// SPDX-License-Identifier: Apache-2.0
//
// Written in 2020-2023 by
//     Dr Maxim Orlovsky <orlovsky@lnp-bp.org>
//
// Copyright (C) 2020-2023 LNP/BP Standards Association. All rights reserved.
// Copyright (C) 2020-2023 Dr Maxim Orlovsky. All rights reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::fmt::Debug;
use std::hash::Hash;
use std::io::Sink;

use bc::VarInt;

use crate::{Decode, Encode, PsbtVer};

/// Raw key data following the key type byte.
pub type KeyData = Vec<u8>;

/// Raw value data of a key-value pair.
pub type ValueData = Vec<u8>;

pub trait KeyType: Copy + Ord + Eq + Hash + Debug + Encode + Decode + 'static {
    const STANDARD: &'static [Self];
    fn from_u8(val: u8) -> Self;
    fn into_u8(self) -> u8;
    fn to_u8(&self) -> u8 { self.into_u8() }
    fn has_key_data(self) -> bool;
    fn present_since(self) -> PsbtVer;
    fn deprecated_since(self) -> Option<PsbtVer>;
    #[inline]
    fn is_allowed(self, version: PsbtVer) -> bool {
        version >= self.present_since()
            && !matches!(self.deprecated_since(), Some(depr) if version >= depr)
    }
    fn is_required(self) -> bool;
    fn is_proprietary(self) -> bool;
}

const PSBT_GLOBAL_UNSIGNED_TX: u8 = 0x00;
const PSBT_GLOBAL_TX_VERSION: u8 = 0x02;
const PSBT_GLOBAL_FALLBACK_LOCKTIME: u8 = 0x03;
const PSBT_GLOBAL_INPUT_COUNT: u8 = 0x04;
const PSBT_GLOBAL_OUTPUT_COUNT: u8 = 0x05;
const PSBT_GLOBAL_VERSION: u8 = 0xFB;
const PSBT_GLOBAL_PROPRIETARY: u8 = 0xFC;

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
#[non_exhaustive]
pub enum GlobalKey {
    /// `PSBT_GLOBAL_UNSIGNED_TX`
    UnsignedTx,

    /// `PSBT_GLOBAL_TX_VERSION`
    TxVersion,

    /// `PSBT_GLOBAL_FALLBACK_LOCKTIME`
    FallbackLocktime,

    /// `PSBT_GLOBAL_INPUT_COUNT`
    InputCount,

    /// `PSBT_GLOBAL_OUTPUT_COUNT`
    OutputCount,

    /// `PSBT_GLOBAL_VERSION`
    Version,

    /// `PSBT_GLOBAL_PROPRIETARY`
    Proprietary,

    /// All unknown keys
    Unknown(u8),
}

impl KeyType for GlobalKey {
    const STANDARD: &'static [Self] = &[
        Self::UnsignedTx,
        Self::TxVersion,
        Self::FallbackLocktime,
        Self::InputCount,
        Self::OutputCount,
        Self::Version,
    ];

    fn from_u8(val: u8) -> Self {
        match val {
            PSBT_GLOBAL_UNSIGNED_TX => Self::UnsignedTx,
            PSBT_GLOBAL_TX_VERSION => Self::TxVersion,
            PSBT_GLOBAL_FALLBACK_LOCKTIME => Self::FallbackLocktime,
            PSBT_GLOBAL_INPUT_COUNT => Self::InputCount,
            PSBT_GLOBAL_OUTPUT_COUNT => Self::OutputCount,
            PSBT_GLOBAL_VERSION => Self::Version,
            PSBT_GLOBAL_PROPRIETARY => Self::Proprietary,
            unknown => Self::Unknown(unknown),
        }
    }

    fn into_u8(self) -> u8 {
        match self {
            GlobalKey::UnsignedTx => PSBT_GLOBAL_UNSIGNED_TX,
            GlobalKey::TxVersion => PSBT_GLOBAL_TX_VERSION,
            GlobalKey::FallbackLocktime => PSBT_GLOBAL_FALLBACK_LOCKTIME,
            GlobalKey::InputCount => PSBT_GLOBAL_INPUT_COUNT,
            GlobalKey::OutputCount => PSBT_GLOBAL_OUTPUT_COUNT,
            GlobalKey::Version => PSBT_GLOBAL_VERSION,
            GlobalKey::Proprietary => PSBT_GLOBAL_PROPRIETARY,
            GlobalKey::Unknown(key_type) => key_type,
        }
    }

    fn has_key_data(self) -> bool {
        matches!(self, GlobalKey::Proprietary | GlobalKey::Unknown(_))
    }

    fn present_since(self) -> PsbtVer {
        match self {
            GlobalKey::UnsignedTx | GlobalKey::Version => PsbtVer::V0,

            GlobalKey::TxVersion
            | GlobalKey::FallbackLocktime
            | GlobalKey::InputCount
            | GlobalKey::OutputCount => PsbtVer::V2,

            GlobalKey::Proprietary | GlobalKey::Unknown(_) => PsbtVer::V0,
        }
    }

    fn deprecated_since(self) -> Option<PsbtVer> {
        match self {
            GlobalKey::UnsignedTx => Some(PsbtVer::V2),
            _ => None,
        }
    }

    fn is_required(self) -> bool {
        matches!(
            self,
            GlobalKey::UnsignedTx
                | GlobalKey::TxVersion
                | GlobalKey::InputCount
                | GlobalKey::OutputCount
                | GlobalKey::Version
        )
    }

    fn is_proprietary(self) -> bool { self == Self::Proprietary }
}

const PSBT_IN_NON_WITNESS_UTXO: u8 = 0x00;
const PSBT_IN_WITNESS_UTXO: u8 = 0x01;
const PSBT_IN_PARTIAL_SIG: u8 = 0x02;
const PSBT_IN_SIGHASH_TYPE: u8 = 0x03;
const PSBT_IN_REDEEM_SCRIPT: u8 = 0x04;
const PSBT_IN_WITNESS_SCRIPT: u8 = 0x05;
const PSBT_IN_BIP32_DERIVATION: u8 = 0x06;
const PSBT_IN_FINAL_SCRIPTSIG: u8 = 0x07;
const PSBT_IN_FINAL_SCRIPTWITNESS: u8 = 0x08;
const PSBT_IN_PREVIOUS_TXID: u8 = 0x0e;
const PSBT_IN_OUTPUT_INDEX: u8 = 0x0f;
const PSBT_IN_SEQUENCE: u8 = 0x10;
const PSBT_IN_TAP_KEY_SIG: u8 = 0x13;
const PSBT_IN_TAP_SCRIPT_SIG: u8 = 0x14;
const PSBT_IN_TAP_LEAF_SCRIPT: u8 = 0x15;
const PSBT_IN_PROPRIETARY: u8 = 0xFC;

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
#[non_exhaustive]
pub enum InputKey {
    /// `PSBT_IN_NON_WITNESS_UTXO`
    NonWitnessUtxo,

    /// `PSBT_IN_WITNESS_UTXO`
    WitnessUtxo,

    /// `PSBT_IN_PARTIAL_SIG`
    PartialSig,

    /// `PSBT_IN_SIGHASH_TYPE`
    SighashType,

    /// `PSBT_IN_REDEEM_SCRIPT`
    RedeemScript,

    /// `PSBT_IN_WITNESS_SCRIPT`
    WitnessScript,

    /// `PSBT_IN_BIP32_DERIVATION`
    Bip32Derivation,

    /// `PSBT_IN_FINAL_SCRIPTSIG`
    FinalScriptSig,

    /// `PSBT_IN_FINAL_SCRIPTWITNESS`
    FinalWitness,

    /// `PSBT_IN_PREVIOUS_TXID`
    PreviousTxid,

    /// `PSBT_IN_OUTPUT_INDEX`
    OutputIndex,

    /// `PSBT_IN_SEQUENCE`
    Sequence,

    /// `PSBT_IN_TAP_KEY_SIG`
    TapKeySig,

    /// `PSBT_IN_TAP_SCRIPT_SIG`
    TapScriptSig,

    /// `PSBT_IN_TAP_LEAF_SCRIPT`
    TapLeafScript,

    /// `PSBT_IN_PROPRIETARY`
    Proprietary,

    /// All unknown keys
    Unknown(u8),
}

impl KeyType for InputKey {
    const STANDARD: &'static [Self] = &[
        Self::NonWitnessUtxo,
        Self::WitnessUtxo,
        Self::PartialSig,
        Self::SighashType,
        Self::RedeemScript,
        Self::WitnessScript,
        Self::Bip32Derivation,
        Self::FinalScriptSig,
        Self::FinalWitness,
        Self::PreviousTxid,
        Self::OutputIndex,
        Self::Sequence,
        Self::TapKeySig,
        Self::TapScriptSig,
        Self::TapLeafScript,
    ];

    fn from_u8(val: u8) -> Self {
        match val {
            PSBT_IN_NON_WITNESS_UTXO => Self::NonWitnessUtxo,
            PSBT_IN_WITNESS_UTXO => Self::WitnessUtxo,
            PSBT_IN_PARTIAL_SIG => Self::PartialSig,
            PSBT_IN_SIGHASH_TYPE => Self::SighashType,
            PSBT_IN_REDEEM_SCRIPT => Self::RedeemScript,
            PSBT_IN_WITNESS_SCRIPT => Self::WitnessScript,
            PSBT_IN_BIP32_DERIVATION => Self::Bip32Derivation,
            PSBT_IN_FINAL_SCRIPTSIG => Self::FinalScriptSig,
            PSBT_IN_FINAL_SCRIPTWITNESS => Self::FinalWitness,
            PSBT_IN_PREVIOUS_TXID => Self::PreviousTxid,
            PSBT_IN_OUTPUT_INDEX => Self::OutputIndex,
            PSBT_IN_SEQUENCE => Self::Sequence,
            PSBT_IN_TAP_KEY_SIG => Self::TapKeySig,
            PSBT_IN_TAP_SCRIPT_SIG => Self::TapScriptSig,
            PSBT_IN_TAP_LEAF_SCRIPT => Self::TapLeafScript,
            PSBT_IN_PROPRIETARY => Self::Proprietary,
            unknown => Self::Unknown(unknown),
        }
    }

    fn into_u8(self) -> u8 {
        match self {
            InputKey::NonWitnessUtxo => PSBT_IN_NON_WITNESS_UTXO,
            InputKey::WitnessUtxo => PSBT_IN_WITNESS_UTXO,
            InputKey::PartialSig => PSBT_IN_PARTIAL_SIG,
            InputKey::SighashType => PSBT_IN_SIGHASH_TYPE,
            InputKey::RedeemScript => PSBT_IN_REDEEM_SCRIPT,
            InputKey::WitnessScript => PSBT_IN_WITNESS_SCRIPT,
            InputKey::Bip32Derivation => PSBT_IN_BIP32_DERIVATION,
            InputKey::FinalScriptSig => PSBT_IN_FINAL_SCRIPTSIG,
            InputKey::FinalWitness => PSBT_IN_FINAL_SCRIPTWITNESS,
            InputKey::PreviousTxid => PSBT_IN_PREVIOUS_TXID,
            InputKey::OutputIndex => PSBT_IN_OUTPUT_INDEX,
            InputKey::Sequence => PSBT_IN_SEQUENCE,
            InputKey::TapKeySig => PSBT_IN_TAP_KEY_SIG,
            InputKey::TapScriptSig => PSBT_IN_TAP_SCRIPT_SIG,
            InputKey::TapLeafScript => PSBT_IN_TAP_LEAF_SCRIPT,
            InputKey::Proprietary => PSBT_IN_PROPRIETARY,
            InputKey::Unknown(key_type) => key_type,
        }
    }

    fn has_key_data(self) -> bool {
        matches!(
            self,
            InputKey::PartialSig
                | InputKey::Bip32Derivation
                | InputKey::TapScriptSig
                | InputKey::TapLeafScript
                | InputKey::Proprietary
                | InputKey::Unknown(_)
        )
    }

    fn present_since(self) -> PsbtVer {
        match self {
            InputKey::PreviousTxid | InputKey::OutputIndex | InputKey::Sequence => PsbtVer::V2,
            _ => PsbtVer::V0,
        }
    }

    fn deprecated_since(self) -> Option<PsbtVer> { None }

    fn is_required(self) -> bool { matches!(self, InputKey::PreviousTxid | InputKey::OutputIndex) }

    fn is_proprietary(self) -> bool { self == Self::Proprietary }
}

const PSBT_OUT_REDEEM_SCRIPT: u8 = 0x00;
const PSBT_OUT_WITNESS_SCRIPT: u8 = 0x01;
const PSBT_OUT_BIP32_DERIVATION: u8 = 0x02;
const PSBT_OUT_AMOUNT: u8 = 0x03;
const PSBT_OUT_SCRIPT: u8 = 0x04;
const PSBT_OUT_PROPRIETARY: u8 = 0xFC;

#[derive(Copy, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Debug)]
#[non_exhaustive]
pub enum OutputKey {
    /// `PSBT_OUT_REDEEM_SCRIPT`
    RedeemScript,

    /// `PSBT_OUT_WITNESS_SCRIPT`
    WitnessScript,

    /// `PSBT_OUT_BIP32_DERIVATION`
    Bip32Derivation,

    /// `PSBT_OUT_AMOUNT`
    Amount,

    /// `PSBT_OUT_SCRIPT`
    Script,

    /// `PSBT_OUT_PROPRIETARY`
    Proprietary,

    /// All unknown keys
    Unknown(u8),
}

impl KeyType for OutputKey {
    const STANDARD: &'static [Self] = &[
        Self::RedeemScript,
        Self::WitnessScript,
        Self::Bip32Derivation,
        Self::Amount,
        Self::Script,
    ];

    fn from_u8(val: u8) -> Self {
        match val {
            PSBT_OUT_REDEEM_SCRIPT => Self::RedeemScript,
            PSBT_OUT_WITNESS_SCRIPT => Self::WitnessScript,
            PSBT_OUT_BIP32_DERIVATION => Self::Bip32Derivation,
            PSBT_OUT_AMOUNT => Self::Amount,
            PSBT_OUT_SCRIPT => Self::Script,
            PSBT_OUT_PROPRIETARY => Self::Proprietary,
            unknown => Self::Unknown(unknown),
        }
    }

    fn into_u8(self) -> u8 {
        match self {
            OutputKey::RedeemScript => PSBT_OUT_REDEEM_SCRIPT,
            OutputKey::WitnessScript => PSBT_OUT_WITNESS_SCRIPT,
            OutputKey::Bip32Derivation => PSBT_OUT_BIP32_DERIVATION,
            OutputKey::Amount => PSBT_OUT_AMOUNT,
            OutputKey::Script => PSBT_OUT_SCRIPT,
            OutputKey::Proprietary => PSBT_OUT_PROPRIETARY,
            OutputKey::Unknown(key_type) => key_type,
        }
    }

    fn has_key_data(self) -> bool {
        matches!(self, OutputKey::Bip32Derivation | OutputKey::Proprietary | OutputKey::Unknown(_))
    }

    fn present_since(self) -> PsbtVer {
        match self {
            OutputKey::Amount | OutputKey::Script => PsbtVer::V2,
            _ => PsbtVer::V0,
        }
    }

    fn deprecated_since(self) -> Option<PsbtVer> { None }

    fn is_required(self) -> bool { matches!(self, OutputKey::Amount | OutputKey::Script) }

    fn is_proprietary(self) -> bool { self == Self::Proprietary }
}

pub enum KeyValue<T: KeyType> {
    Pair(KeyPair<T, KeyData, ValueData>),
    Separator,
}

pub struct KeyPair<T: KeyType, K, V> {
    pub key_type: T,
    pub key_data: K,
    pub value_data: V,
}

impl<T: KeyType, K, V> KeyPair<T, K, V> {
    pub fn new(key_type: T, key_data: K, value_data: V) -> Self {
        Self {
            key_type,
            key_data,
            value_data,
        }
    }

    pub fn key_len(&self) -> VarInt
    where K: Encode {
        let mut sink = Sink::default();
        let count = self.key_data.encode(&mut sink).expect("sink write doesn't fail");
        let len = count + 1 /* key type byte */;
        VarInt::with(len)
    }

    pub fn value_len(&self) -> VarInt
    where V: Encode {
        let mut sink = Sink::default();
        let len = self.value_data.encode(&mut sink).expect("sink write doesn't fail");
        VarInt::with(len)
    }
}

/// Key of a proprietary key-value pair (`0xFC` key type).
#[derive(Clone, PartialOrd, Ord, Eq, PartialEq, Hash, Debug, Display)]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "camelCase")
)]
#[display("{identifier} {subtype:#x}")]
pub struct PropKey {
    pub identifier: String,
    pub subtype: u64,
    pub data: Vec<u8>,
}

impl PropKey {
    /// Identifier of proprietary keys defined by this library.
    pub const IDENTIFIER: &'static str = "psbt-std";

    /// Taproot annex of an input.
    pub const SUBTYPE_ANNEX: u64 = 0x00;

    /// Explicit witness stack override of an input.
    pub const SUBTYPE_WITNESS_STACK: u64 = 0x01;

    pub fn own(subtype: u64) -> Self {
        PropKey {
            identifier: Self::IDENTIFIER.to_owned(),
            subtype,
            data: none!(),
        }
    }

    pub fn is_own(&self, subtype: u64) -> bool {
        self.identifier == Self::IDENTIFIER && self.subtype == subtype && self.data.is_empty()
    }
}
