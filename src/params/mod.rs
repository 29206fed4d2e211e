//! Parameter conversion registry
//!
//! Every tunable module has two packed representations: the *wire* layout
//! exchanged with the tuning tool and the *internal* layout the camera
//! pipeline works with. The registry holds one [`ParameterDescriptor`] per
//! module plus the shared internal snapshot of each module.
//!
//! # Architecture
//!
//! ```text
//!   GET (static, initialized) ──► cached snapshot ──► to_wire ──► reply
//!   GET (dynamic / cold) ──► probe ──► pipeline thread ──► complete_probe
//!                                                    (cache + to_wire)
//!   SET ──► apply_wire_with (to_internal into cache, pipeline.apply under lock)
//! ```
//!
//! Descriptors are immutable after construction. The snapshots and their
//! `initialized` flags sit behind one registry mutex; this is a low-rate
//! control path, and a single lock keeps concurrent GET/SET/completion
//! from ever observing a half-written snapshot.
//!
//! # Conversion policy
//!
//! The generic conversion maps the one-byte wire enable flag onto the native
//! boolean and copies `min(internal - bool, wire - 1)` bytes after it,
//! truncating silently. Modules whose layouts diverge register a pair of
//! override functions (see [`modules`]).

pub mod layout;
pub mod modules;

use crate::error::{Result, TuningError};
use crate::pipeline::PipelineControl;
use crate::protocol::ids::isp_command;
use layout::{ByteReader, ByteWriter, BOOL_WIDTH};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

pub use modules::{builtin_descriptors, control_id, module_id};

/// Converter from one packed layout into another. The destination is
/// pre-sized; for wire-to-internal it is the live snapshot and fields the
/// converter does not write keep their value.
pub type ConvertFn = fn(src: &[u8], dst: &mut [u8]);

/// How a descriptor translates between layouts
#[derive(Debug, Clone, Copy)]
pub enum Conversion {
    Generic,
    Custom {
        to_wire: ConvertFn,
        to_internal: ConvertFn,
    },
}

/// Static description of one tunable module
#[derive(Debug, Clone)]
pub struct ParameterDescriptor {
    /// Id relative to the ISP command base
    pub module_id: u32,
    pub name: &'static str,
    /// Pipeline channel the parameters travel on
    pub control: PipelineControl,
    pub internal_size: usize,
    pub wire_size: usize,
    /// Re-sampled from the pipeline on every GET
    pub dynamic: bool,
    /// Wire `(offset, len)` ranges synthesized on export and ignored on import
    pub read_only: &'static [(usize, usize)],
    pub conversion: Conversion,
}

impl ParameterDescriptor {
    /// Wire command id of this module
    pub fn command_id(&self) -> u32 {
        isp_command(self.module_id)
    }

    /// Convert an internal snapshot into a fresh wire buffer
    pub fn to_wire(&self, internal: &[u8]) -> Vec<u8> {
        let mut wire = vec![0u8; self.wire_size];
        match self.conversion {
            Conversion::Generic => generic_to_wire(internal, &mut wire),
            Conversion::Custom { to_wire, .. } => to_wire(internal, &mut wire),
        }
        wire
    }

    /// Convert a wire buffer into `internal`, in place
    pub fn to_internal(&self, wire: &[u8], internal: &mut [u8]) {
        match self.conversion {
            Conversion::Generic => generic_to_internal(wire, internal),
            Conversion::Custom { to_internal, .. } => to_internal(wire, internal),
        }
    }

    /// Whether the wire byte at `offset` is read-only
    pub fn is_read_only(&self, offset: usize) -> bool {
        self.read_only
            .iter()
            .any(|&(start, len)| offset >= start && offset < start + len)
    }
}

fn generic_to_wire(internal: &[u8], wire: &mut [u8]) {
    if wire.is_empty() {
        return;
    }
    let mut r = ByteReader::new(internal);
    wire[0] = u8::from(r.flag());
    let n = internal.len().saturating_sub(BOOL_WIDTH).min(wire.len() - 1);
    wire[1..1 + n].copy_from_slice(r.bytes(n));
}

fn generic_to_internal(wire: &[u8], internal: &mut [u8]) {
    let Some((&enable, body)) = wire.split_first() else {
        return;
    };
    let n = internal.len().saturating_sub(BOOL_WIDTH).min(body.len());
    ByteWriter::new(internal).flag(enable != 0).put(&body[..n]);
}

/// Per-module mutable state
#[derive(Debug)]
struct ModuleState {
    internal: Vec<u8>,
    initialized: bool,
}

/// Process-wide table of descriptors and shared snapshots
#[derive(Debug)]
pub struct ParamRegistry {
    descriptors: BTreeMap<u32, ParameterDescriptor>,
    state: Mutex<HashMap<u32, ModuleState>>,
}

impl Default for ParamRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ParamRegistry {
    /// Registry of all built-in modules
    pub fn builtin() -> Self {
        let descriptors = builtin_descriptors()
            .into_iter()
            .map(|d| (d.module_id, d))
            .collect();
        Self::from_map(descriptors)
    }

    /// Registry of an arbitrary descriptor set; duplicate ids are rejected
    pub fn with_descriptors(
        descriptors: impl IntoIterator<Item = ParameterDescriptor>,
    ) -> Result<Self> {
        let mut map = BTreeMap::new();
        for d in descriptors {
            if let Some(previous) = map.insert(d.module_id, d) {
                return Err(TuningError::Config(format!(
                    "module id {} registered twice ({})",
                    previous.module_id, previous.name
                )));
            }
        }
        Ok(Self::from_map(map))
    }

    fn from_map(descriptors: BTreeMap<u32, ParameterDescriptor>) -> Self {
        let state = descriptors
            .values()
            .map(|d| {
                (
                    d.module_id,
                    ModuleState {
                        internal: vec![0u8; d.internal_size],
                        initialized: false,
                    },
                )
            })
            .collect();
        Self {
            descriptors,
            state: Mutex::new(state),
        }
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn descriptor(&self, module_id: u32) -> Option<&ParameterDescriptor> {
        self.descriptors.get(&module_id)
    }

    /// Descriptors in module id order
    pub fn descriptors(&self) -> impl Iterator<Item = &ParameterDescriptor> {
        self.descriptors.values()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u32, ModuleState>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lookup(&self, module_id: u32) -> Result<&ParameterDescriptor> {
        self.descriptor(module_id)
            .ok_or(TuningError::UnknownModule(module_id))
    }

    /// Wire image of the cached snapshot when it can answer a GET without a
    /// pipeline round trip (static and already initialized)
    pub fn cached_wire(&self, module_id: u32) -> Result<Option<Vec<u8>>> {
        let descriptor = self.lookup(module_id)?;
        if descriptor.dynamic {
            return Ok(None);
        }
        let state = self.lock();
        Ok(state
            .get(&module_id)
            .filter(|s| s.initialized)
            .map(|s| descriptor.to_wire(&s.internal)))
    }

    /// Store a snapshot delivered by the pipeline and return its wire image
    pub fn complete_probe(&self, module_id: u32, snapshot: &[u8]) -> Result<Vec<u8>> {
        let descriptor = self.lookup(module_id)?;
        let mut state = self.lock();
        let entry = state
            .get_mut(&module_id)
            .ok_or(TuningError::UnknownModule(module_id))?;

        let n = snapshot.len().min(entry.internal.len());
        entry.internal[..n].copy_from_slice(&snapshot[..n]);
        entry.initialized = true;
        Ok(descriptor.to_wire(&entry.internal))
    }

    /// Merge a wire payload from a SET into the cached snapshot and hand the
    /// resulting internal image to `apply` before the registry lock is
    /// released, so the pipeline sees SETs in cache order.
    ///
    /// A payload shorter than the wire layout only updates the fields it
    /// covers; the rest keep their cached value.
    pub fn apply_wire_with<F>(&self, module_id: u32, payload: &[u8], apply: F) -> Result<()>
    where
        F: FnOnce(&[u8]) -> Result<()>,
    {
        let descriptor = self.lookup(module_id)?;
        let mut state = self.lock();
        let entry = state
            .get_mut(&module_id)
            .ok_or(TuningError::UnknownModule(module_id))?;

        if payload.len() >= descriptor.wire_size {
            descriptor.to_internal(&payload[..descriptor.wire_size], &mut entry.internal);
        } else {
            let mut wire = descriptor.to_wire(&entry.internal);
            wire[..payload.len()].copy_from_slice(payload);
            descriptor.to_internal(&wire, &mut entry.internal);
        }
        apply(&entry.internal)
    }

    /// Copy of the cached internal snapshot
    pub fn internal_snapshot(&self, module_id: u32) -> Result<Vec<u8>> {
        self.lookup(module_id)?;
        let state = self.lock();
        state
            .get(&module_id)
            .map(|s| s.internal.clone())
            .ok_or(TuningError::UnknownModule(module_id))
    }

    pub fn is_initialized(&self, module_id: u32) -> bool {
        self.lock()
            .get(&module_id)
            .map(|s| s.initialized)
            .unwrap_or(false)
    }

    /// Forget every cached snapshot so the next GET re-probes the pipeline
    pub fn reset(&self) {
        for state in self.lock().values_mut() {
            state.initialized = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn generic_descriptor(id: u32, internal: usize, wire: usize) -> ParameterDescriptor {
        ParameterDescriptor {
            module_id: id,
            name: "test",
            control: PipelineControl::CarMod,
            internal_size: internal,
            wire_size: wire,
            dynamic: false,
            read_only: &[],
            conversion: Conversion::Generic,
        }
    }

    /// Make an arbitrary buffer a valid wire image of `d`
    fn sanitize(d: &ParameterDescriptor, wire: &mut [u8]) {
        wire[0] &= 1;
        if d.module_id == module_id::OBC {
            // gains are f32 at 3..67; NaN payloads do not survive widening
            for gain in wire[3..67].chunks_mut(4) {
                let v = f32::from_le_bytes([gain[0], gain[1], gain[2], gain[3]]);
                if v.is_nan() {
                    gain.copy_from_slice(&0f32.to_le_bytes());
                }
            }
        }
    }

    #[test]
    fn test_builtin_registry() {
        let registry = ParamRegistry::builtin();
        assert_eq!(registry.len(), 24);
        assert!(registry.descriptor(control_id::AE).unwrap().dynamic);
        assert!(registry.descriptor(999).is_none());
        assert_eq!(
            registry.descriptor(module_id::OBC).unwrap().command_id(),
            10_008
        );
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let err = ParamRegistry::with_descriptors([
            generic_descriptor(1, 4, 4),
            generic_descriptor(1, 8, 8),
        ])
        .unwrap_err();
        assert!(matches!(err, TuningError::Config(_)));
    }

    #[test]
    fn test_generic_truncates_to_shorter_side() {
        let d = generic_descriptor(1, 6, 4);
        let internal = [1u8, 10, 11, 12, 13, 14];
        assert_eq!(d.to_wire(&internal), vec![1, 10, 11, 12]);

        let mut back = [0u8; 6];
        d.to_internal(&[1, 20, 21, 22], &mut back);
        assert_eq!(back, [1, 20, 21, 22, 0, 0]);
    }

    #[test]
    fn test_unknown_module() {
        let registry = ParamRegistry::builtin();
        assert!(matches!(
            registry.cached_wire(4242),
            Err(TuningError::UnknownModule(4242))
        ));
        assert!(registry.apply_wire_with(4242, &[1], |_| Ok(())).is_err());
    }

    #[test]
    fn test_static_cache_lifecycle() {
        let registry = ParamRegistry::builtin();
        assert_eq!(registry.cached_wire(module_id::CAR).unwrap(), None);

        let wire = registry.complete_probe(module_id::CAR, &[1]).unwrap();
        assert_eq!(wire, vec![1]);
        assert!(registry.is_initialized(module_id::CAR));
        assert_eq!(registry.cached_wire(module_id::CAR).unwrap(), Some(vec![1]));

        registry.reset();
        assert_eq!(registry.cached_wire(module_id::CAR).unwrap(), None);
    }

    #[test]
    fn test_dynamic_never_cached() {
        let registry = ParamRegistry::builtin();
        let size = registry.descriptor(module_id::SAT).unwrap().internal_size;
        registry
            .complete_probe(module_id::SAT, &vec![1u8; size])
            .unwrap();
        assert_eq!(registry.cached_wire(module_id::SAT).unwrap(), None);
    }

    #[test]
    fn test_apply_short_payload_keeps_tail() {
        let registry = ParamRegistry::builtin();
        registry
            .complete_probe(module_id::CFA, &[1, 7, 8])
            .unwrap();
        let mut applied = Vec::new();
        registry
            .apply_wire_with(module_id::CFA, &[0, 9], |internal| {
                applied = internal.to_vec();
                Ok(())
            })
            .unwrap();
        assert_eq!(applied, vec![0, 9, 8]);
        assert_eq!(registry.internal_snapshot(module_id::CFA).unwrap(), applied);
    }

    #[test]
    fn test_every_descriptor_survives_empty_snapshot() {
        let registry = ParamRegistry::builtin();
        for d in registry.descriptors() {
            let wire = d.to_wire(&[]);
            assert_eq!(wire.len(), d.wire_size, "{}", d.name);
            let mut internal = vec![0u8; d.internal_size];
            d.to_internal(&[], &mut internal);
        }
    }

    proptest! {
        #[test]
        fn prop_static_round_trip_preserves_settable_fields(
            seed in proptest::collection::vec(any::<u8>(), 1024),
        ) {
            let registry = ParamRegistry::builtin();
            for d in registry.descriptors().filter(|d| !d.dynamic) {
                let mut wire = seed[..d.wire_size].to_vec();
                sanitize(d, &mut wire);

                let mut internal = vec![0u8; d.internal_size];
                d.to_internal(&wire, &mut internal);
                let back = d.to_wire(&internal);

                for offset in (0..d.wire_size).filter(|&o| !d.is_read_only(o)) {
                    prop_assert_eq!(
                        back[offset], wire[offset],
                        "{} differs at wire offset {}", d.name, offset
                    );
                }
            }
        }

        #[test]
        fn prop_dynamic_round_trip_preserves_settable_prefix(
            seed in proptest::collection::vec(any::<u8>(), 1024),
        ) {
            let registry = ParamRegistry::builtin();
            for d in registry.descriptors().filter(|d| d.dynamic) {
                let mut wire = seed[..d.wire_size].to_vec();
                sanitize(d, &mut wire);

                let mut internal = vec![0u8; d.internal_size];
                d.to_internal(&wire, &mut internal);
                let back = d.to_wire(&internal);

                for offset in (0..d.wire_size).filter(|&o| !d.is_read_only(o)) {
                    prop_assert_eq!(back[offset], wire[offset], "{} offset {}", d.name, offset);
                }
            }
        }
    }
}
