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

use std::collections::BTreeMap;
use std::io::Read;

use indexmap::IndexMap;

use crate::keys::KeyValue;
use crate::{Decode, DecodeError, KeyData, KeyType, PropKey, PsbtError, PsbtVer, ValueData};

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Display)]
#[display(lowercase)]
pub enum MapName {
    Global,
    Input,
    Output,
}

/// Key-value map as it is read from the stream, before its values are interpreted.
#[derive(Clone, Eq, PartialEq, Debug)]
pub struct Map<K: KeyType> {
    pub name: MapName,
    pub singular: BTreeMap<K, ValueData>,
    pub plural: BTreeMap<K, BTreeMap<KeyData, ValueData>>,
    pub proprietary: IndexMap<PropKey, ValueData>,
    pub unknown: IndexMap<u8, IndexMap<KeyData, ValueData>>,
}

impl<K: KeyType> Map<K> {
    fn new(name: MapName) -> Self {
        Map {
            name,
            singular: empty!(),
            plural: empty!(),
            proprietary: empty!(),
            unknown: empty!(),
        }
    }

    pub fn parse(name: MapName, stream: &mut impl Read) -> Result<Self, DecodeError> {
        let mut map = Map::<K>::new(name);

        while let KeyValue::<K>::Pair(pair) = KeyValue::<K>::decode(stream)? {
            let key_type = pair.key_type;
            if map.singular.contains_key(&key_type) {
                return Err(PsbtError::RepeatedKey(name, key_type.to_u8()).into());
            }
            if key_type.is_proprietary() {
                let prop_key = PropKey::deserialize(pair.key_data)?;
                if map.proprietary.contains_key(&prop_key) {
                    return Err(PsbtError::RepeatedPropKey(name, prop_key).into());
                }
                map.proprietary.insert(prop_key, pair.value_data);
            } else if K::STANDARD.contains(&key_type) {
                if key_type.has_key_data() {
                    let submap = map.plural.entry(key_type).or_default();
                    if submap.insert(pair.key_data, pair.value_data).is_some() {
                        return Err(PsbtError::RepeatedKey(name, key_type.to_u8()).into());
                    }
                } else {
                    if !pair.key_data.is_empty() {
                        return Err(PsbtError::NonEmptyKeyData(name, key_type.to_u8()).into());
                    }
                    map.singular.insert(key_type, pair.value_data);
                }
            } else {
                let submap = map.unknown.entry(key_type.to_u8()).or_default();
                if submap.contains_key(&pair.key_data) {
                    return Err(PsbtError::RepeatedUnknownKey(name, key_type.to_u8()).into());
                }
                submap.insert(pair.key_data, pair.value_data);
            }
        }

        Ok(map)
    }

    /// Checks that the map contains only keys allowed by the given PSBT version and all keys
    /// required by it.
    pub fn check(&self, version: PsbtVer) -> Result<(), PsbtError> {
        for key_type in self.singular.keys().chain(self.plural.keys()) {
            if !key_type.is_allowed(version) {
                return Err(PsbtError::UnexpectedKey(self.name, key_type.to_u8(), version));
            }
        }
        for key_type in K::STANDARD {
            let present = if key_type.has_key_data() {
                self.plural.contains_key(key_type)
            } else {
                self.singular.contains_key(key_type)
            };
            if key_type.is_required() && key_type.is_allowed(version) && !present {
                return Err(PsbtError::RequiredKeyAbsent(self.name, key_type.to_u8(), version));
            }
        }
        Ok(())
    }

    #[inline]
    pub fn take(&mut self, key_type: K) -> Option<ValueData> { self.singular.remove(&key_type) }

    #[inline]
    pub fn take_plural(&mut self, key_type: K) -> BTreeMap<KeyData, ValueData> {
        self.plural.remove(&key_type).unwrap_or_default()
    }

    /// Extracts a proprietary key defined by this library.
    pub fn take_own(&mut self, subtype: u64) -> Option<ValueData> {
        let key = self.proprietary.keys().find(|key| key.is_own(subtype))?.clone();
        self.proprietary.shift_remove(&key)
    }
}

#[cfg(test)]
mod test {
    use std::io::Cursor;

    use super::*;
    use crate::{GlobalKey, InputKey};

    #[test]
    fn repeated_key() {
        let data = [0x01, 0x02, 0x01, 0x00, 0x01, 0x02, 0x01, 0x00, 0x00];
        assert_eq!(
            Map::<InputKey>::parse(MapName::Input, &mut Cursor::new(data)),
            Err(PsbtError::RepeatedKey(MapName::Input, 0x02).into())
        );
    }

    #[test]
    fn unknown_and_separator() {
        let data = [0x02, 0x42, 0xaa, 0x01, 0xbb, 0x00];
        let map = Map::<GlobalKey>::parse(MapName::Global, &mut Cursor::new(data)).unwrap();
        assert_eq!(map.unknown[&0x42][&vec![0xaa]], vec![0xbb]);
        assert!(map.singular.is_empty());
    }

    #[test]
    fn required_keys() {
        let data = [0x00];
        let map = Map::<GlobalKey>::parse(MapName::Global, &mut Cursor::new(data)).unwrap();
        assert_eq!(
            map.check(PsbtVer::V2),
            Err(PsbtError::RequiredKeyAbsent(MapName::Global, 0x02, PsbtVer::V2))
        );
    }
}
