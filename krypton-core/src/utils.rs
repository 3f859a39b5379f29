use std::fs::File;
use std::io::{Read, Result as IoResult, Write};
use std::path::Path;

use crate::primitives::Hash;
use crate::serial::{SerialBuffer, SerialEncode};

/// Pairwise Blake2b merkle root. An odd node is paired with itself; an empty
/// list yields the null hash.
pub fn merkle_root(leaves: &[Hash]) -> Hash {
    if leaves.is_empty() {
        return Hash::NULL;
    }

    let mut layer = leaves.to_vec();
    while layer.len() > 1 {
        let mut new_layer = Vec::with_capacity(layer.len().div_ceil(2));
        for pair in layer.chunks(2) {
            let left = pair[0];
            let right = pair.get(1).unwrap_or(&pair[0]);

            let mut concat = SerialBuffer::with_capacity(64);
            left.serialize_to(&mut concat);
            right.serialize_to(&mut concat);
            new_layer.push(Hash::light(concat.as_bytes()));
        }
        layer = new_layer;
    }

    layer[0]
}

/// Types persisted as files (wallets, genesis accounts).
pub trait Saveable
where
    Self: Sized,
{
    fn load<I: Read>(reader: I) -> IoResult<Self>;
    fn save<O: Write>(&self, writer: O) -> IoResult<()>;
    fn save_to_file<P: AsRef<Path>>(&self, path: P) -> IoResult<()> {
        let file = File::create(&path)?;
        self.save(file)
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> IoResult<Self> {
        let file = File::open(&path)?;
        Self::load(file)
    }
}
