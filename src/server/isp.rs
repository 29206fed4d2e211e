//! ISP parameter handler
//!
//! GET answers from the cached snapshot when the module is static and has
//! been sampled once; otherwise it probes the pipeline. SET merges the wire
//! payload into the snapshot and pushes the internal image to the module's
//! control channel without acknowledgement.

use super::context::ServerContext;
use super::response::Response;
use crate::error::{Result, TuningError};
use crate::protocol::{CommandHeader, Direction};
use std::sync::Arc;

pub struct IspParamHandler {
    ctx: Arc<ServerContext>,
}

impl IspParamHandler {
    pub fn new(ctx: Arc<ServerContext>) -> Self {
        Self { ctx }
    }

    pub fn handle(&self, request: &CommandHeader, module_id: u32, payload: &[u8]) -> Result<Response> {
        match request.direction() {
            Direction::Get => {
                let wire = self.get(module_id)?;
                Ok(Response::reply(*request, wire))
            }
            Direction::Set => {
                self.set(module_id, payload)?;
                Ok(Response::Silent)
            }
        }
    }

    /// Current wire image of `module_id`
    pub fn get(&self, module_id: u32) -> Result<Vec<u8>> {
        if let Some(wire) = self.ctx.registry.cached_wire(module_id)? {
            tracing::trace!("Module {} served from cache", module_id);
            return Ok(wire);
        }
        self.ctx.probes.fetch(module_id, self.ctx.pipeline.as_ref())
    }

    pub fn set(&self, module_id: u32, payload: &[u8]) -> Result<()> {
        let control = self
            .ctx
            .registry
            .descriptor(module_id)
            .map(|d| d.control)
            .ok_or(TuningError::UnknownModule(module_id))?;

        tracing::debug!("{} <- {} byte(s)", control, payload.len());
        self.ctx
            .registry
            .apply_wire_with(module_id, payload, |internal| {
                self.ctx.pipeline.apply(control, internal)
            })
    }
}
