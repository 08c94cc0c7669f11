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

//! Partially signed bitcoin transactions (BIP-174 and BIP-370).
//!
//! The crate provides the packet data model together with the updater, signer, combiner,
//! analyzer, finalizer and extractor roles, and the binary codec for the explicit-field
//! (version 2) format. It never holds private keys: signatures are produced by a callback
//! which receives the digest to sign.

#[macro_use]
extern crate amplify;
#[macro_use]
extern crate log;
#[cfg(feature = "serde")]
#[macro_use]
extern crate serde_crate as serde;

mod script;
mod taproot;
mod sighash;
mod keys;
mod maps;
mod data;
mod coders;
mod updater;
mod sign;
mod combine;
mod analyze;
mod finalize;
mod extract;

pub use analyze::{Analysis, InputAnalysis, Missing};
pub use coders::{Decode, DecodeError, Encode, EncodeError, PsbtError, PsbtParseError, RawBytes};
pub use combine::{CombineError, TemplateMismatch};
pub use data::{
    IncompleteTemplate, Input, KeyOrigin, Output, PrevoutError, Psbt, PsbtUnsupportedVer, PsbtVer,
    TxTemplate, UnsignedTx, UnsignedTxIn, UtxoMismatch,
};
pub use extract::ExtractError;
pub use finalize::FinalizeError;
pub use keys::{GlobalKey, InputKey, KeyData, KeyPair, KeyType, OutputKey, PropKey, ValueData};
pub use maps::MapName;
pub use script::{
    count_sig_ops, pubkey_hash, push_slice, remove_code_separators, script_hash, wscript_hash,
    xonly_pushes, Instr, Instructions, Multisig, ScriptClass, SpendClass,
};
pub use sighash::{SighashCache, SighashError};
pub use sign::{Rejected, SigData, SignError, SignRequest, SignerKey};
pub use taproot::InvalidControlBlock;
pub use updater::UpdateError;
