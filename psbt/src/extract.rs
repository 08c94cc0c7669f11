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

use bc::Tx;

use crate::{IncompleteTemplate, Psbt};

#[derive(Copy, Clone, Eq, PartialEq, Debug, Display, Error, From)]
#[display(doc_comments)]
pub enum ExtractError {
    /// input #{0} is not finalized.
    NotFinalized(usize),

    #[from]
    #[display(inner)]
    Incomplete(IncompleteTemplate),
}

impl Psbt {
    /// Assembles the signed transaction from the unsigned one and final scriptSigs and witnesses
    /// of the inputs. All inputs must be finalized.
    pub fn extract(&self) -> Result<Tx, ExtractError> {
        if let Some(input) = self.inputs.iter().find(|input| !input.is_final()) {
            return Err(ExtractError::NotFinalized(input.index));
        }
        let unsigned_tx = self.to_unsigned_tx()?;
        let tx = unsigned_tx.to_tx_with(|index| {
            self.inputs
                .get(index)
                .map(|input| {
                    (
                        input.final_script_sig.clone().unwrap_or_default(),
                        input.final_witness.clone().unwrap_or_default(),
                    )
                })
                .unwrap_or_default()
        });
        debug!("extracted signed transaction {}", tx.txid());
        Ok(tx)
    }
}

#[cfg(test)]
mod test {
    use bc::{Outpoint, Sats, ScriptPubkey, SigScript, TxVer, Txid, Vout};

    use super::*;

    #[test]
    fn requires_all_final() {
        let mut psbt = Psbt::create_v2(TxVer::V2, None, 2, 1);
        assert_eq!(psbt.extract(), Err(ExtractError::NotFinalized(0)));

        for input in &mut psbt.inputs {
            input.final_script_sig = Some(SigScript::from_unsafe(vec![0x51]));
        }
        assert_eq!(psbt.extract(), Err(ExtractError::Incomplete(IncompleteTemplate::Input(0))));

        for (index, input) in psbt.inputs.iter_mut().enumerate() {
            input.previous_outpoint =
                Some(Outpoint::new(Txid::from([4u8; 32]), Vout::from_u32(index as u32)));
        }
        psbt.outputs[0].amount = Some(Sats(10));
        psbt.outputs[0].script = Some(ScriptPubkey::from_unsafe(vec![0x51]));
        let tx = psbt.extract().unwrap();
        assert_eq!(tx.inputs.len(), 2);
        assert_eq!(tx.inputs[1].sig_script, SigScript::from_unsafe(vec![0x51]));
        assert_eq!(tx.inputs[1].prev_output.vout, Vout::from_u32(1));
    }
}
