//! In-memory collaborators for tests across the workspace.

use crate::collaborators::{
    BlockTx, EconomicError, EconomicLedger, LedgerError, LedgerQuery, MessageType,
    MessagingError, OutPoint, PayoutFragment, PeerMessaging, TxRecord, Utxo,
};
use crate::types::{Address, Amount, BlockHeight, BondRef, Hash256};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Deterministic address from a small seed.
pub fn addr(n: u8) -> Address {
    let mut bytes = [0u8; 20];
    bytes[0] = 0xa0;
    bytes[19] = n;
    Address(bytes)
}

fn counter_hash(tag: u8, n: u64) -> Hash256 {
    let mut bytes = [0u8; 32];
    bytes[0] = tag;
    bytes[24..].copy_from_slice(&n.to_be_bytes());
    Hash256(bytes)
}

// ==================== LEDGER ====================

#[derive(Default)]
struct LedgerInner {
    height: BlockHeight,
    synced: bool,
    index_available: bool,
    utxos: HashMap<Address, Vec<Utxo>>,
    history: HashMap<Address, Vec<TxRecord>>,
    blocks: BTreeMap<BlockHeight, Vec<BlockTx>>,
    next_tx: u64,
}

/// Scriptable chain view.
pub struct MockLedger {
    inner: RwLock<LedgerInner>,
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new(0)
    }
}

impl MockLedger {
    pub fn new(height: BlockHeight) -> Self {
        MockLedger {
            inner: RwLock::new(LedgerInner {
                height,
                synced: true,
                index_available: true,
                ..Default::default()
            }),
        }
    }

    pub fn set_height(&self, height: BlockHeight) {
        self.inner.write().height = height;
    }

    pub fn set_synced(&self, synced: bool) {
        self.inner.write().synced = synced;
    }

    pub fn set_index_available(&self, available: bool) {
        self.inner.write().index_available = available;
    }

    pub fn add_utxo(&self, owner: Address, amount: Amount, creation_height: BlockHeight, funding_source: Address) {
        let mut inner = self.inner.write();
        inner.next_tx += 1;
        let outpoint = OutPoint { txid: counter_hash(0x01, inner.next_tx), vout: 0 };
        inner.utxos.entry(owner).or_default().push(Utxo {
            outpoint,
            amount,
            creation_height,
            funding_source,
        });
    }

    /// Records a transaction in both the address index and the raw block.
    pub fn add_tx(&self, owner: Address, height: BlockHeight, counterparties: Vec<Address>) {
        let mut inner = self.inner.write();
        inner.next_tx += 1;
        let tx_hash = counter_hash(0x02, inner.next_tx);
        let mut participants = vec![owner];
        participants.extend(counterparties.iter().copied());
        inner.blocks.entry(height).or_default().push(BlockTx { tx_hash, participants });
        inner.history.entry(owner).or_default().push(TxRecord {
            tx_hash,
            height,
            counterparties,
        });
    }

    /// Adds an eligible-looking validator: three funding sources, aged stake
    /// and enough history at the current height.
    pub fn seed_validator(&self, owner: Address, stake: Amount, history_txs: u64, unique: u8) {
        let height = self.current_height();
        for i in 0..3u8 {
            self.add_utxo(owner, stake / 3 + if i == 0 { stake % 3 } else { 0 }, 1, addr(200 + i));
        }
        for t in 0..history_txs {
            let peer = addr(100 + (t % unique.max(1) as u64) as u8);
            self.add_tx(owner, 1 + t % height.max(1), vec![peer]);
        }
    }
}

impl LedgerQuery for MockLedger {
    fn current_height(&self) -> BlockHeight {
        self.inner.read().height
    }

    fn is_synced(&self) -> bool {
        self.inner.read().synced
    }

    fn utxos_for(&self, address: &Address) -> Result<Vec<Utxo>, LedgerError> {
        Ok(self.inner.read().utxos.get(address).cloned().unwrap_or_default())
    }

    fn tx_history_for<'a>(
        &'a self,
        address: &Address,
    ) -> Result<Box<dyn Iterator<Item = TxRecord> + 'a>, LedgerError> {
        let inner = self.inner.read();
        if !inner.index_available {
            return Err(LedgerError::IndexUnavailable);
        }
        let records = inner.history.get(address).cloned().unwrap_or_default();
        Ok(Box::new(records.into_iter()))
    }

    fn block_transactions(&self, height: BlockHeight) -> Result<Vec<BlockTx>, LedgerError> {
        Ok(self.inner.read().blocks.get(&height).cloned().unwrap_or_default())
    }
}

// ==================== MESSAGING ====================

/// Records every delivery; selected peers can be marked unreachable.
#[derive(Default)]
pub struct RecordingMessenger {
    sent: Mutex<Vec<(Address, MessageType, Vec<u8>)>>,
    unreachable: RwLock<HashSet<Address>>,
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_unreachable(&self, peer: Address) {
        self.unreachable.write().insert(peer);
    }

    pub fn sent(&self) -> Vec<(Address, MessageType, Vec<u8>)> {
        self.sent.lock().clone()
    }

    pub fn recipients(&self) -> Vec<Address> {
        self.sent.lock().iter().map(|(a, _, _)| *a).collect()
    }
}

impl PeerMessaging for RecordingMessenger {
    fn send_to(&self, peer: &Address, kind: MessageType, payload: &[u8]) -> Result<(), MessagingError> {
        if self.unreachable.read().contains(peer) {
            return Err(MessagingError::Unreachable(*peer));
        }
        self.sent.lock().push((*peer, kind, payload.to_vec()));
        Ok(())
    }
}

// ==================== ECONOMICS ====================

struct Bond {
    owner: Address,
    remaining: Amount,
}

#[derive(Default)]
struct EconomicInner {
    balances: HashMap<Address, Amount>,
    bonds: HashMap<BondRef, Bond>,
    paid: HashSet<Hash256>,
    burned: Amount,
    next_bond: u64,
    fail_payouts: u32,
}

/// Balance book with bond custody and idempotent payouts.
#[derive(Default)]
pub struct MemoryEconomicLedger {
    inner: Mutex<EconomicInner>,
}

impl MemoryEconomicLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fund(&self, owner: Address, amount: Amount) {
        *self.inner.lock().balances.entry(owner).or_default() += amount;
    }

    pub fn balance_of(&self, owner: &Address) -> Amount {
        self.inner.lock().balances.get(owner).copied().unwrap_or(0)
    }

    pub fn bonded(&self, bond: &BondRef) -> Option<Amount> {
        self.inner.lock().bonds.get(bond).map(|b| b.remaining)
    }

    pub fn bond_owner(&self, bond: &BondRef) -> Option<Address> {
        self.inner.lock().bonds.get(bond).map(|b| b.owner)
    }

    pub fn burned(&self) -> Amount {
        self.inner.lock().burned
    }

    pub fn paid_fragments(&self) -> usize {
        self.inner.lock().paid.len()
    }

    /// Makes the next `n` payouts fail before touching any balance.
    pub fn fail_next_payouts(&self, n: u32) {
        self.inner.lock().fail_payouts = n;
    }
}

impl EconomicLedger for MemoryEconomicLedger {
    fn lock(&self, owner: &Address, amount: Amount) -> Result<BondRef, EconomicError> {
        let mut inner = self.inner.lock();
        let available = inner.balances.get(owner).copied().unwrap_or(0);
        if available < amount {
            return Err(EconomicError::InsufficientFunds {
                owner: *owner,
                needed: amount,
                available,
            });
        }
        inner.balances.insert(*owner, available - amount);
        inner.next_bond += 1;
        let bond = BondRef(counter_hash(0x03, inner.next_bond));
        inner.bonds.insert(bond, Bond { owner: *owner, remaining: amount });
        Ok(bond)
    }

    fn payout(&self, bonds: &[BondRef], fragments: &[PayoutFragment]) -> Result<(), EconomicError> {
        let mut inner = self.inner.lock();
        if inner.fail_payouts > 0 {
            inner.fail_payouts -= 1;
            return Err(EconomicError::Ledger("injected payout failure".into()));
        }

        let fresh: Vec<&PayoutFragment> = fragments
            .iter()
            .filter(|f| !inner.paid.contains(&f.id))
            .collect();
        let requested: Amount = fresh.iter().map(|f| f.amount).sum();

        let mut available: Amount = 0;
        for bond in bonds {
            match inner.bonds.get(bond) {
                Some(b) => available += b.remaining,
                None => return Err(EconomicError::UnknownBond(*bond)),
            }
        }
        if requested > available {
            return Err(EconomicError::PayoutExceedsBond { requested, available });
        }

        let mut owed = requested;
        for bond in bonds {
            if owed == 0 {
                break;
            }
            if let Some(b) = inner.bonds.get_mut(bond) {
                let take = owed.min(b.remaining);
                b.remaining -= take;
                owed -= take;
            }
        }

        for fragment in fresh {
            inner.paid.insert(fragment.id);
            match fragment.recipient {
                Some(to) => *inner.balances.entry(to).or_default() += fragment.amount,
                None => inner.burned += fragment.amount,
            }
        }
        Ok(())
    }
}
