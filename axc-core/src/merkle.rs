use crate::hash::Hash32;
use crate::transaction::Transaction;

/// Pairwise SHA-256 Merkle root over transaction hashes. The last hash of an
/// odd level is duplicated. An empty transaction list hashes to SHA-256 of
/// an empty input.
pub fn merkle_root(transactions: &[Transaction]) -> Hash32 {
    if transactions.is_empty() {
        return Hash32::of(&[]);
    }
    let mut level: Vec<Hash32> = transactions.iter().map(Transaction::hash).collect();
    while level.len() > 1 {
        let mut next = Vec::with_capacity((level.len() + 1) / 2);
        for pair in level.chunks(2) {
            let mut buf = Vec::with_capacity(64);
            buf.extend_from_slice(&pair[0].0);
            buf.extend_from_slice(&pair.get(1).unwrap_or(&pair[0]).0);
            next.push(Hash32::of(&buf));
        }
        level = next;
    }
    level[0]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::TransactionType;

    fn tx(nonce: u64) -> Transaction {
        Transaction {
            from: "AXa".into(),
            to: "AXb".into(),
            amount: 1,
            fee: 0,
            timestamp: 0,
            nonce,
            tx_type: TransactionType::Transfer,
            memo: None,
            signature: None,
        }
    }

    #[test]
    fn empty_list_hashes_empty_input() {
        assert_eq!(merkle_root(&[]), Hash32::of(&[]));
    }

    #[test]
    fn single_tx_root_is_its_own_hash_level() {
        let t = tx(0);
        // one element: level collapses directly after hashing(t,t) once more is not
        // performed when len==1, so root equals the tx hash itself.
        assert_eq!(merkle_root(&[t.clone()]), t.hash());
    }

    #[test]
    fn odd_level_duplicates_last_hash() {
        let a = tx(0);
        let b = tx(1);
        let c = tx(2);
        let root_three = merkle_root(&[a.clone(), b.clone(), c.clone()]);

        let mut buf = Vec::new();
        buf.extend_from_slice(&a.hash().0);
        buf.extend_from_slice(&b.hash().0);
        let ab = Hash32::of(&buf);

        let mut buf2 = Vec::new();
        buf2.extend_from_slice(&c.hash().0);
        buf2.extend_from_slice(&c.hash().0);
        let cc = Hash32::of(&buf2);

        let mut buf3 = Vec::new();
        buf3.extend_from_slice(&ab.0);
        buf3.extend_from_slice(&cc.0);
        let expected = Hash32::of(&buf3);

        assert_eq!(root_three, expected);
    }
}
