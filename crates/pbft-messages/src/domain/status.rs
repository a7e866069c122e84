//! # Status Descriptor
//!
//! A replica's snapshot of what it knows, exchanged periodically so peers can
//! retransmit exactly what is missing.
//!
//! ## Modes
//!
//! - **nv-info** (normal case): `prepared` and `committed` bitmaps indexed by
//!   offset from `last_executed`, plus [`BrInfo`] records naming pre-prepares
//!   with missing big requests.
//! - **view change**: a bitmap of view-change messages already held, plus
//!   [`PpInfo`] records naming missing pre-prepares.
//!
//! ## Wire Layout
//!
//! ```text
//! view i64 | ls i64 | le i64 | id i32 | sz i16 | brsz i16 | flags u8
//! nv-info:      prepared [sz] | committed [sz] | BR_info [brsz]
//! view change:  vcs [4] | PP_info [sz]
//! auth_sig_size u32 (signature mode only) | authenticator
//! ```
//!
//! Calling a mutator or observer of the other mode is a caller bug and panics.

use super::bitmap::{BrMap, WindowBitmap};
use super::context::ReplicaContext;
use super::envelope::{AuthKind, AuthLayout, Authenticator};
use super::errors::{MessageError, MessageResult};
use super::wire::{WireReader, WireWriter};
use super::{NodeId, Seqno, View, MAX_NUM_REPLICAS, VCS_SIZE};
use crate::ports::inbound::ProtocolMessage;
use tracing::{debug, trace};

/// Fixed header length.
pub const STATUS_HEADER_LEN: usize = 33;

const FLAG_NV_INFO: u8 = 1;
const FLAG_NV_M: u8 = 2;

/// A pre-prepare with missing big requests (nv-info mode).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BrInfo {
    pub seqno: Seqno,
    pub missing: BrMap,
}

impl BrInfo {
    pub const WIRE_SIZE: usize = 16;
}

/// A missing pre-prepare (view-change mode).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PpInfo {
    /// Minimum view of the missing pre-prepare
    pub min_view: View,
    /// Seqno offset from `last_stable`
    pub offset: i32,
    /// Prepares are needed to attest the request's authenticity
    pub proof_needed: bool,
    pub missing: BrMap,
}

impl PpInfo {
    pub const WIRE_SIZE: usize = 24;
}

/// Item yielded by [`PpsIter`], with the seqno made absolute.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MissingPrePrepare {
    pub min_view: View,
    pub seqno: Seqno,
    pub missing: BrMap,
    pub proof_needed: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum StatusBody {
    NvInfo {
        prepared: WindowBitmap,
        committed: WindowBitmap,
        breqs: Vec<BrInfo>,
    },
    ViewChange {
        vcs: WindowBitmap,
        pps: Vec<PpInfo>,
    },
}

/// A status message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Status {
    view: View,
    last_stable: Seqno,
    last_executed: Seqno,
    id: NodeId,
    has_nv_m: bool,
    body: StatusBody,
    window: usize,
    max_message_size: usize,
    /// Authenticator bytes the message must leave room for
    auth_reserve: usize,
    auth: Authenticator,
}

impl Status {
    /// Fresh, unauthenticated status from the local replica.
    ///
    /// `has_nv_info` selects the mode; `has_nv_m` records whether the sender
    /// holds a new-view message for `view`.
    pub fn new(
        ctx: &ReplicaContext<'_>,
        view: View,
        last_stable: Seqno,
        last_executed: Seqno,
        has_nv_info: bool,
        has_nv_m: bool,
    ) -> Self {
        let window = ctx.config().window_size;
        let body = if has_nv_info {
            StatusBody::NvInfo {
                prepared: WindowBitmap::new(window),
                committed: WindowBitmap::new(window),
                breqs: Vec::new(),
            }
        } else {
            StatusBody::ViewChange {
                vcs: WindowBitmap::new(MAX_NUM_REPLICAS),
                pps: Vec::new(),
            }
        };

        trace!(view, last_stable, last_executed, has_nv_info, "Built status");
        Self {
            view,
            last_stable,
            last_executed,
            id: ctx.local_id(),
            has_nv_m,
            body,
            window,
            max_message_size: ctx.config().max_message_size,
            auth_reserve: Self::auth_reserve(ctx, ctx.local_id()),
            auth: Authenticator::default(),
        }
    }

    fn auth_reserve(ctx: &ReplicaContext<'_>, sender: NodeId) -> usize {
        let strategy = ctx.strategy();
        let field = if strategy.has_length_field() { 4 } else { 0 };
        field + strategy.authenticator_size(ctx.identity(), sender)
    }

    /// Bitmap index for `n`, if `0 < n - last_executed <= window`.
    fn window_index(&self, n: Seqno) -> Option<usize> {
        let offset = n.checked_sub(self.last_executed)?;
        (offset > 0 && (offset as u64) <= self.window as u64).then(|| offset as usize - 1)
    }

    fn assert_room(&self, record: usize) {
        let size = self.content_len() + record + self.auth_reserve;
        assert!(size <= self.max_message_size, "Message too small");
    }

    // =========================================================================
    // NV-INFO MODE
    // =========================================================================

    /// Mark `n` prepared in `view()`. No effect outside the window.
    pub fn mark_prepared(&mut self, n: Seqno) {
        let index = self.window_index(n);
        match &mut self.body {
            StatusBody::NvInfo { prepared, .. } => {
                if let Some(i) = index {
                    prepared.set(i);
                }
            }
            StatusBody::ViewChange { .. } => panic!("mark_prepared requires has_nv_info"),
        }
    }

    /// Mark `n` committed. No effect outside the window.
    pub fn mark_committed(&mut self, n: Seqno) {
        let index = self.window_index(n);
        match &mut self.body {
            StatusBody::NvInfo { committed, .. } => {
                if let Some(i) = index {
                    committed.set(i);
                }
            }
            StatusBody::ViewChange { .. } => panic!("mark_committed requires has_nv_info"),
        }
    }

    pub fn is_prepared(&self, n: Seqno) -> bool {
        match &self.body {
            StatusBody::NvInfo { prepared, .. } => {
                self.window_index(n).is_some_and(|i| prepared.test(i))
            }
            StatusBody::ViewChange { .. } => panic!("is_prepared requires has_nv_info"),
        }
    }

    pub fn is_committed(&self, n: Seqno) -> bool {
        match &self.body {
            StatusBody::NvInfo { committed, .. } => {
                self.window_index(n).is_some_and(|i| committed.test(i))
            }
            StatusBody::ViewChange { .. } => panic!("is_committed requires has_nv_info"),
        }
    }

    /// Record that the requests set in `missing` are absent from the
    /// pre-prepare with seqno `n`.
    ///
    /// # Panics
    /// Outside nv-info mode, when `n` is not in
    /// `(last_executed, last_stable + window]`, or when the record no longer fits.
    pub fn add_breqs(&mut self, n: Seqno, missing: BrMap) {
        assert!(self.has_nv_info(), "add_breqs requires has_nv_info");
        assert!(
            n > self.last_executed && n <= self.last_stable.saturating_add(self.window as i64),
            "Invalid arguments"
        );
        self.assert_room(BrInfo::WIRE_SIZE);
        if let StatusBody::NvInfo { breqs, .. } = &mut self.body {
            assert!(breqs.len() < i16::MAX as usize, "Message too small");
            breqs.push(BrInfo { seqno: n, missing });
        }
    }

    /// Cursor over the [`BrInfo`] records in insertion order.
    pub fn brs_iter(&self) -> BrsIter<'_> {
        match &self.body {
            StatusBody::NvInfo { breqs, .. } => BrsIter {
                records: breqs.iter(),
            },
            StatusBody::ViewChange { .. } => panic!("brs_iter requires has_nv_info"),
        }
    }

    // =========================================================================
    // VIEW-CHANGE MODE
    // =========================================================================

    /// Mark the view-change message from replica `i` as held.
    pub fn mark_vcs(&mut self, i: NodeId) {
        match &mut self.body {
            StatusBody::ViewChange { vcs, .. } => {
                assert!(
                    i >= 0 && (i as usize) < VCS_SIZE * 8,
                    "Invalid argument"
                );
                vcs.set(i as usize);
            }
            StatusBody::NvInfo { .. } => panic!("mark_vcs requires !has_nv_info"),
        }
    }

    pub fn has_vc(&self, i: NodeId) -> bool {
        match &self.body {
            StatusBody::ViewChange { vcs, .. } => {
                assert!(
                    i >= 0 && (i as usize) < VCS_SIZE * 8,
                    "Invalid argument"
                );
                vcs.test(i as usize)
            }
            StatusBody::NvInfo { .. } => panic!("has_vc requires !has_nv_info"),
        }
    }

    /// Record a missing pre-prepare with seqno `n` for some view `>= view`.
    ///
    /// # Panics
    /// In nv-info mode, when `n` is not in `[last_stable, last_stable + window]`,
    /// or when the record no longer fits.
    pub fn append_pps(&mut self, view: View, n: Seqno, missing: BrMap, proof_needed: bool) {
        assert!(!self.has_nv_info(), "append_pps requires !has_nv_info");
        let offset = n.checked_sub(self.last_stable).unwrap_or(-1);
        assert!(
            (0..=self.window as i64).contains(&offset),
            "Invalid arguments"
        );
        self.assert_room(PpInfo::WIRE_SIZE);
        if let StatusBody::ViewChange { pps, .. } = &mut self.body {
            assert!(pps.len() < i16::MAX as usize, "Message too small");
            pps.push(PpInfo {
                min_view: view,
                offset: offset as i32,
                proof_needed,
                missing,
            });
        }
    }

    /// Cursor over the missing pre-prepares in insertion order.
    pub fn pps_iter(&self) -> PpsIter<'_> {
        match &self.body {
            StatusBody::ViewChange { pps, .. } => PpsIter {
                last_stable: self.last_stable,
                records: pps.iter(),
            },
            StatusBody::NvInfo { .. } => panic!("pps_iter requires !has_nv_info"),
        }
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    /// Sender id.
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn last_stable(&self) -> Seqno {
        self.last_stable
    }

    pub fn last_executed(&self) -> Seqno {
        self.last_executed
    }

    pub fn has_nv_info(&self) -> bool {
        matches!(self.body, StatusBody::NvInfo { .. })
    }

    pub fn has_nv_m(&self) -> bool {
        self.has_nv_m
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.auth
    }

    /// Where the authenticator sits in the encoded status.
    pub fn layout(&self, ctx: &ReplicaContext<'_>) -> AuthLayout {
        let covered = self.content_len();
        let field = if ctx.strategy().has_length_field() { 4 } else { 0 };
        AuthLayout {
            kind: AuthKind::Broadcast,
            src_offset: 0,
            auth_len: covered,
            dst_offset: covered + field,
        }
    }

    // =========================================================================
    // AUTHENTICATION & VERIFICATION
    // =========================================================================

    /// Seal with the deployment's broadcast authenticator.
    pub fn authenticate(&mut self, ctx: &ReplicaContext<'_>) -> MessageResult<()> {
        let covered = self.content_bytes();
        self.auth = ctx.strategy().authenticate(ctx.identity(), &covered)?;
        Ok(())
    }

    /// Structural checks on a received status.
    pub fn pre_verify(&self, ctx: &ReplicaContext<'_>) -> bool {
        let reject = |reason: &str| {
            debug!(sender = self.id, view = self.view, reason, "Rejecting status");
            false
        };

        let window = ctx.config().window_size as i64;
        if self.view < 0 || self.last_stable < 0 {
            return reject("negative view or last stable");
        }
        let Some(window_end) = self.last_stable.checked_add(window) else {
            return reject("window end overflows");
        };
        if self.last_executed < self.last_stable || self.last_executed > window_end {
            return reject("last executed outside window");
        }

        let identity = ctx.identity();
        if !identity.is_replica(self.id) || self.id == ctx.local_id() {
            return reject("sender is not a remote replica");
        }

        let records_fit = match &self.body {
            StatusBody::NvInfo {
                prepared,
                committed,
                ..
            } => {
                let expected = ctx.config().bitmap_bytes();
                if prepared.byte_len() != expected || committed.byte_len() != expected {
                    return reject("bitmap size differs from window");
                }
                true
            }
            StatusBody::ViewChange { pps, .. } => {
                pps.iter().all(|pp| pp.offset >= 0 && i64::from(pp.offset) <= window)
            }
        };
        if !records_fit {
            return reject("record outside window");
        }

        let size = self.content_len() + self.length_field(ctx) + self.auth.region.len();
        if size > ctx.config().max_message_size {
            return reject("message too large");
        }

        let required = ctx.strategy().authenticator_size(identity, self.id);
        if self.auth.region.len() < required {
            return reject("authenticator too short");
        }

        true
    }

    /// `pre_verify` plus the authenticator check for the local replica.
    pub fn verify(&self, ctx: &ReplicaContext<'_>) -> bool {
        if !self.pre_verify(ctx) {
            return false;
        }
        let covered = self.content_bytes();
        let valid = ctx
            .strategy()
            .verify(ctx.identity(), self.id, &covered, &self.auth);
        if !valid {
            debug!(sender = self.id, view = self.view, "Rejecting status: authenticator mismatch");
        }
        valid
    }

    // =========================================================================
    // WIRE
    // =========================================================================

    fn length_field(&self, ctx: &ReplicaContext<'_>) -> usize {
        if ctx.strategy().has_length_field() {
            4
        } else {
            0
        }
    }

    /// Header plus trailing arrays; the authenticated range.
    fn content_len(&self) -> usize {
        STATUS_HEADER_LEN
            + match &self.body {
                StatusBody::NvInfo {
                    prepared,
                    committed,
                    breqs,
                } => prepared.byte_len() + committed.byte_len() + breqs.len() * BrInfo::WIRE_SIZE,
                StatusBody::ViewChange { pps, .. } => VCS_SIZE + pps.len() * PpInfo::WIRE_SIZE,
            }
    }

    fn content_bytes(&self) -> Vec<u8> {
        let mut w = WireWriter::with_capacity(self.content_len());
        let mut flags = 0u8;
        if self.has_nv_info() {
            flags |= FLAG_NV_INFO;
        }
        if self.has_nv_m {
            flags |= FLAG_NV_M;
        }

        let (sz, brsz) = match &self.body {
            StatusBody::NvInfo {
                prepared, breqs, ..
            } => (prepared.byte_len(), breqs.len()),
            StatusBody::ViewChange { pps, .. } => (pps.len(), 0),
        };

        w.put_i64(self.view)
            .put_i64(self.last_stable)
            .put_i64(self.last_executed)
            .put_i32(self.id)
            .put_i16(sz as i16)
            .put_i16(brsz as i16)
            .put_u8(flags);

        match &self.body {
            StatusBody::NvInfo {
                prepared,
                committed,
                breqs,
            } => {
                w.put_bytes(prepared.as_bytes()).put_bytes(committed.as_bytes());
                for br in breqs {
                    w.put_i64(br.seqno).put_u64(br.missing.bits());
                }
            }
            StatusBody::ViewChange { vcs, pps } => {
                w.put_bytes(vcs.as_bytes());
                for pp in pps {
                    w.put_i64(pp.min_view)
                        .put_i32(pp.offset)
                        .put_i32(i32::from(pp.proof_needed))
                        .put_u64(pp.missing.bits());
                }
            }
        }
        w.into_bytes()
    }

    /// Encode with the authenticator.
    pub fn encode(&self, ctx: &ReplicaContext<'_>) -> MessageResult<Vec<u8>> {
        let mut w = WireWriter::with_capacity(
            self.content_len() + self.length_field(ctx) + self.auth.region.len(),
        );
        w.put_bytes(&self.content_bytes());
        if ctx.strategy().has_length_field() {
            w.put_u32(self.auth.sig_len);
        }
        w.put_bytes(&self.auth.region);

        let max = ctx.config().max_message_size;
        if w.len() > max {
            return Err(MessageError::MessageTooLarge {
                size: w.len(),
                max,
            });
        }
        Ok(w.into_bytes())
    }

    /// Decode a received status. Declared sizes are checked against the
    /// buffer and the configured maximum before the trailing arrays are read.
    pub fn decode(bytes: &[u8], ctx: &ReplicaContext<'_>) -> MessageResult<Self> {
        let max = ctx.config().max_message_size;
        if bytes.len() > max {
            return Err(MessageError::MessageTooLarge {
                size: bytes.len(),
                max,
            });
        }

        let mut r = WireReader::new(bytes);
        let view = r.i64("view")?;
        let last_stable = r.i64("last_stable")?;
        let last_executed = r.i64("last_executed")?;
        let id = r.i32("id")?;
        let sz = r.i16("sz")?;
        let brsz = r.i16("brsz")?;
        let flags = r.u8("flags")?;
        if flags & !(FLAG_NV_INFO | FLAG_NV_M) != 0 {
            return Err(MessageError::InvalidModeFlag(flags));
        }

        let sz = usize::try_from(sz).map_err(|_| MessageError::DeclaredSizeExceedsBuffer {
            field: "sz",
            declared: 0,
            limit: r.remaining(),
        })?;
        let brsz = usize::try_from(brsz).map_err(|_| MessageError::DeclaredSizeExceedsBuffer {
            field: "brsz",
            declared: 0,
            limit: r.remaining(),
        })?;

        let body = if flags & FLAG_NV_INFO != 0 {
            let trailing = 2 * sz + brsz * BrInfo::WIRE_SIZE;
            if trailing > r.remaining() {
                return Err(MessageError::DeclaredSizeExceedsBuffer {
                    field: "nv-info arrays",
                    declared: trailing,
                    limit: r.remaining(),
                });
            }
            let prepared = WindowBitmap::from_bytes(r.take("prepared", sz)?);
            let committed = WindowBitmap::from_bytes(r.take("committed", sz)?);
            let mut breqs = Vec::with_capacity(brsz);
            for _ in 0..brsz {
                breqs.push(BrInfo {
                    seqno: r.i64("br_info.seqno")?,
                    missing: BrMap::from_bits(r.u64("br_info.map")?),
                });
            }
            StatusBody::NvInfo {
                prepared,
                committed,
                breqs,
            }
        } else {
            let trailing = VCS_SIZE + sz * PpInfo::WIRE_SIZE;
            if trailing > r.remaining() {
                return Err(MessageError::DeclaredSizeExceedsBuffer {
                    field: "view-change arrays",
                    declared: trailing,
                    limit: r.remaining(),
                });
            }
            let vcs = WindowBitmap::from_bytes(r.take("vcs", VCS_SIZE)?);
            let mut pps = Vec::with_capacity(sz);
            for _ in 0..sz {
                pps.push(PpInfo {
                    min_view: r.i64("pp_info.view")?,
                    offset: r.i32("pp_info.offset")?,
                    proof_needed: r.i32("pp_info.proof")? != 0,
                    missing: BrMap::from_bits(r.u64("pp_info.map")?),
                });
            }
            StatusBody::ViewChange { vcs, pps }
        };

        let sig_len = if ctx.strategy().has_length_field() {
            r.u32("auth_sig_size")?
        } else {
            0
        };
        let region = r.rest().to_vec();
        if sig_len as usize > region.len() {
            return Err(MessageError::DeclaredSizeExceedsBuffer {
                field: "authenticator",
                declared: sig_len as usize,
                limit: region.len(),
            });
        }

        Ok(Self {
            view,
            last_stable,
            last_executed,
            id,
            has_nv_m: flags & FLAG_NV_M != 0,
            body,
            window: ctx.config().window_size,
            max_message_size: max,
            auth_reserve: Self::auth_reserve(ctx, id),
            auth: Authenticator { region, sig_len },
        })
    }
}

impl ProtocolMessage for Status {
    fn sender(&self) -> NodeId {
        self.id
    }

    fn authenticate(&mut self, ctx: &ReplicaContext<'_>) -> MessageResult<()> {
        Status::authenticate(self, ctx)
    }

    fn pre_verify(&self, ctx: &ReplicaContext<'_>) -> bool {
        Status::pre_verify(self, ctx)
    }

    fn verify(&self, ctx: &ReplicaContext<'_>) -> bool {
        Status::verify(self, ctx)
    }

    fn encode(&self, ctx: &ReplicaContext<'_>) -> MessageResult<Vec<u8>> {
        Status::encode(self, ctx)
    }
}

// =============================================================================
// CURSORS
// =============================================================================

/// Single-pass cursor over a status message's [`BrInfo`] records.
///
/// Yields `(seqno, missing)` in storage order. Build a new cursor to start over.
#[derive(Clone, Debug)]
pub struct BrsIter<'a> {
    records: std::slice::Iter<'a, BrInfo>,
}

impl Iterator for BrsIter<'_> {
    type Item = (Seqno, BrMap);

    fn next(&mut self) -> Option<Self::Item> {
        self.records.next().map(|br| (br.seqno, br.missing))
    }
}

/// Single-pass cursor over a status message's missing pre-prepares.
#[derive(Clone, Debug)]
pub struct PpsIter<'a> {
    last_stable: Seqno,
    records: std::slice::Iter<'a, PpInfo>,
}

impl Iterator for PpsIter<'_> {
    type Item = MissingPrePrepare;

    fn next(&mut self) -> Option<Self::Item> {
        // Records past the representable seqno range end the cursor
        let pp = self.records.next()?;
        let seqno = self.last_stable.checked_add(Seqno::from(pp.offset))?;
        Some(MissingPrePrepare {
            min_view: pp.min_view,
            seqno,
            missing: pp.missing,
            proof_needed: pp.proof_needed,
        })
    }
}
