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

use std::collections::HashMap;

use bc::secp256k1::{Keypair, Message, SecretKey, SECP256K1};
use bc::{CompressedPk, SighashType, XOnlyPk};
use psbt::{Psbt, Rejected, SigData, SignError, SignRequest, SignerKey};

/// In-memory holder of secret keys producing signatures for [`Psbt::sign`].
///
/// Taproot keypairs must already be tweaked: they sign key path digests of outputs committing
/// to their x-only public key.
#[derive(Clone, Default)]
pub struct KeySigner {
    ecdsa: HashMap<CompressedPk, SecretKey>,
    bip340: HashMap<XOnlyPk, Keypair>,
}

impl KeySigner {
    pub fn new() -> Self { Self::default() }

    pub fn with(
        ecdsa: impl IntoIterator<Item = SecretKey>,
        bip340: impl IntoIterator<Item = Keypair>,
    ) -> Self {
        let mut signer = Self::new();
        ecdsa.into_iter().for_each(|sk| {
            signer.add_ecdsa(sk);
        });
        bip340.into_iter().for_each(|keypair| {
            signer.add_bip340(keypair);
        });
        signer
    }

    pub fn add_ecdsa(&mut self, sk: SecretKey) -> CompressedPk {
        let pk = CompressedPk::from(sk.public_key(SECP256K1));
        self.ecdsa.insert(pk, sk);
        pk
    }

    pub fn add_bip340(&mut self, keypair: Keypair) -> XOnlyPk {
        let pk = XOnlyPk::from(keypair.x_only_public_key().0);
        self.bip340.insert(pk, keypair);
        pk
    }

    pub fn ecdsa_keys(&self) -> impl Iterator<Item = CompressedPk> + '_ {
        self.ecdsa.keys().copied()
    }

    pub fn bip340_keys(&self) -> impl Iterator<Item = XOnlyPk> + '_ { self.bip340.keys().copied() }

    /// Produces the signature for a request, provided that the requested key is held by the
    /// signer.
    pub fn sign_request(&self, request: &SignRequest) -> Result<SigData, Rejected> {
        match request.key {
            SignerKey::Ecdsa(pk) => {
                let sk = self.ecdsa.get(&pk).ok_or(Rejected)?;
                let msg = Message::from(request.sighash);
                Ok(SigData::Ecdsa(SECP256K1.sign_ecdsa(&msg, sk)))
            }
            SignerKey::Bip340(pk) => {
                let keypair = self.bip340.get(&pk).ok_or(Rejected)?;
                let sig = SECP256K1.sign_schnorr(&<[u8; 32]>::from(request.sighash), keypair);
                Ok(SigData::Bip340(sig))
            }
        }
    }

    /// Callback to be passed to [`Psbt::sign`].
    pub fn sign_fn(&self) -> impl Fn(&SignRequest) -> Result<SigData, Rejected> + '_ {
        move |request| self.sign_request(request)
    }

    /// Signs every non-final input with each key which is able to spend it.
    ///
    /// ECDSA keys are used only for inputs listing them among BIP-32 derivations, since the
    /// signer can't tell otherwise whether a key participates in a script. Taproot keys sign key
    /// paths of outputs committing to them. Returns the number of added signatures.
    pub fn sign_all(
        &self,
        psbt: &mut Psbt,
        sighash_type: Option<SighashType>,
    ) -> Result<usize, SignError> {
        let mut count = 0usize;
        for index in 0..psbt.inputs().len() {
            let input = &psbt.inputs()[index];
            if input.is_final() {
                continue;
            }
            let mut keys = self
                .ecdsa
                .keys()
                .filter(|pk| input.bip32_derivation.contains_key(*pk))
                .map(|pk| SignerKey::Ecdsa(*pk))
                .collect::<Vec<_>>();
            if input.tap_key_sig.is_none() {
                keys.extend(self.bip340.keys().map(|pk| SignerKey::Bip340(*pk)));
            }

            for key in keys {
                match psbt.sign(index, key, sighash_type, self.sign_fn()) {
                    Ok(()) => count += 1,
                    Err(SignError::KeyMismatch(..)) | Err(SignError::UnsupportedScriptType(..)) => {
                        trace!("key {key} can't sign input #{index}");
                    }
                    Err(err) => return Err(err),
                }
            }
        }
        debug!("signer added {count} signatures");
        Ok(count)
    }
}
