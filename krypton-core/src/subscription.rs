use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::block::Block;
use crate::primitives::Address;
use crate::serial::{SerialBuffer, SerialDecode, SerialEncode, SerialError};
use crate::transactions::Transaction;

/// What a peer (or a local listener) wants to hear about.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subscription {
    #[default]
    None,
    Any,
    /// Blocks, plus transactions sent from or to one of the addresses. An
    /// empty set means blocks only.
    Addresses(BTreeSet<Address>),
}

impl Subscription {
    const TYPE_NONE: u8 = 0;
    const TYPE_ANY: u8 = 1;
    const TYPE_ADDRESSES: u8 = 2;

    /// The wire form counts addresses with a u16.
    pub const MAX_ADDRESSES: usize = u16::MAX as usize;

    /// Keeps at most `MAX_ADDRESSES` distinct addresses.
    pub fn from_addresses(addresses: impl IntoIterator<Item = Address>) -> Self {
        let mut set = BTreeSet::new();
        for address in addresses {
            if set.len() == Self::MAX_ADDRESSES {
                break;
            }
            set.insert(address);
        }
        Subscription::Addresses(set)
    }

    pub fn blocks_only() -> Self {
        Subscription::Addresses(BTreeSet::new())
    }

    fn type_id(&self) -> u8 {
        match self {
            Subscription::None => Self::TYPE_NONE,
            Subscription::Any => Self::TYPE_ANY,
            Subscription::Addresses(_) => Self::TYPE_ADDRESSES,
        }
    }

    pub fn matches_block(&self, _block: &Block) -> bool {
        !matches!(self, Subscription::None)
    }

    pub fn matches_transaction(&self, transaction: &Transaction) -> bool {
        match self {
            Subscription::None => false,
            Subscription::Any => true,
            Subscription::Addresses(addresses) => {
                addresses.contains(transaction.sender()) || addresses.contains(transaction.recipient())
            }
        }
    }

    pub fn is_subset_of(&self, other: &Subscription) -> bool {
        match (self, other) {
            (_, Subscription::Any) | (Subscription::None, _) => true,
            (Subscription::Addresses(ours), Subscription::Addresses(theirs)) => {
                ours.is_subset(theirs)
            }
            _ => false,
        }
    }
}

impl SerialEncode for Subscription {
    fn serialize_to(&self, buf: &mut SerialBuffer) {
        buf.write_u8(self.type_id());
        if let Subscription::Addresses(addresses) = self {
            // Sets built directly or from JSON may exceed the cap; only the
            // lowest MAX_ADDRESSES addresses go on the wire.
            let count = addresses.len().min(Self::MAX_ADDRESSES);
            buf.write_u16(count as u16);
            for address in addresses.iter().take(count) {
                address.serialize_to(buf);
            }
        }
    }

    fn serialized_size(&self) -> usize {
        match self {
            Subscription::Addresses(addresses) => {
                1 + 2 + addresses.len().min(Self::MAX_ADDRESSES) * Address::SIZE
            }
            _ => 1,
        }
    }
}

impl SerialDecode for Subscription {
    fn unserialize(buf: &mut SerialBuffer) -> Result<Self, SerialError> {
        match buf.read_u8()? {
            Self::TYPE_NONE => Ok(Subscription::None),
            Self::TYPE_ANY => Ok(Subscription::Any),
            Self::TYPE_ADDRESSES => {
                let count = buf.read_u16()?;
                let addresses = (0..count)
                    .map(|_| Address::unserialize(buf))
                    .collect::<Result<BTreeSet<_>, _>>()?;
                Ok(Subscription::Addresses(addresses))
            }
            other => Err(SerialError::InvalidValue {
                what: "subscription type",
                value: u64::from(other),
            }),
        }
    }
}

impl fmt::Display for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Subscription::None => write!(f, "Subscription{{type=none}}"),
            Subscription::Any => write!(f, "Subscription{{type=any}}"),
            Subscription::Addresses(addresses) => {
                let addresses: Vec<String> = addresses.iter().map(Address::to_hex).collect();
                write!(f, "Subscription{{type=addresses, addresses=[{}]}}", addresses.join(", "))
            }
        }
    }
}
