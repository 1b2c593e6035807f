//! LE Link Layer feature bits relevant to broadcast audio.
//!
//! Whether a PA sync can be handed over by the peer (PAST) depends on both sides: the peer must
//! support sending a sync transfer and the local controller must support receiving one.

use bitflags::bitflags;

bitflags! {
    /// A set of LE Link Layer features, as exchanged by the feature exchange procedure.
    pub struct FeatureSet: u64 {
        /// Low-Energy data encryption.
        const LE_ENCRYPTION = (1 << 0);

        /// LE Extended Advertising.
        const EXTENDED_ADVERTISING = (1 << 12);

        /// LE Periodic Advertising.
        const PERIODIC_ADVERTISING = (1 << 13);

        /// Periodic Advertising Sync Transfer, sender side.
        ///
        /// A connected peer with this bit can hand its own PA sync over to us.
        const PAST_SENDER = (1 << 24);

        /// Periodic Advertising Sync Transfer, recipient side.
        const PAST_RECIPIENT = (1 << 25);

        /// Isochronous Broadcaster.
        const ISOCHRONOUS_BROADCASTER = (1 << 30);

        /// Synchronized Receiver (can sync to a BIG).
        const SYNCHRONIZED_RECEIVER = (1 << 31);
    }
}

impl FeatureSet {
    /// Returns whether a PA sync can be transferred from a peer with `peer` features to a
    /// controller with `self` features.
    pub fn can_receive_past_from(&self, peer: FeatureSet) -> bool {
        self.contains(FeatureSet::PAST_RECIPIENT) && peer.contains(FeatureSet::PAST_SENDER)
    }
}
