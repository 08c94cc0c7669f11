// Modern, minimalistic & standard-compliant cold wallet library.
//
// SPDX-License-Identifier: Apache-2.0
//
// Written in 2020-2024 by
//     Dr Maxim Orlovsky <orlovsky@lnp-bp.org>
//
// Copyright (C) 2020-2024 LNP/BP Standards Association. All rights reserved.
// Copyright (C) 2020-2024 Dr Maxim Orlovsky. All rights reserved.
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

//! Partially signed bitcoin transaction workflow: creating, updating, signing, combining,
//! analyzing, finalizing and extracting transactions.
//!
//! The crate re-exports the [`psbt`] engine together with the consensus types used in its API.
//! With the `signers` feature it also provides [`KeySigner`], an in-memory key holder producing
//! signatures for [`Psbt::sign`].

#[cfg(feature = "signers")]
#[macro_use]
extern crate log;

#[cfg(feature = "signers")]
mod signers;

pub use bc::{
    secp256k1, Bip340Sig, CompressedPk, ControlBlock, InternalPk, LeafVer, LegacySig, LockTime,
    NonStandardValue, Outpoint, Parity, RedeemScript, Sats, ScriptPubkey, SeqNo, SigError,
    SigScript, Sighash, SighashFlag, SighashType, TapLeafHash, TapScript, Tx, TxIn, TxOut, TxVer,
    Txid, Vout, Witness, WitnessScript, XOnlyPk,
};
pub use psbt::*;
#[cfg(feature = "signers")]
pub use signers::KeySigner;
