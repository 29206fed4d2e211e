//! General command handler
//!
//! Commands below the ISP range: protocol version, liveness, image export
//! and the handful of server-level switches. Several SET commands exist on
//! the wire without behaviour on this target; they are accepted, logged and
//! otherwise ignored.

use super::context::ServerContext;
use super::response::{PixelPacket, Response};
use crate::error::Result;
use crate::pipeline::{ImageInfo, ImageKind, LifecycleAction};
use crate::protocol::ids::SERVER_VERSION;
use crate::protocol::{CommandHeader, CommandValue, Direction, GeneralCommand, GeneralGet, GeneralSet};
use std::sync::Arc;

pub struct GeneralCommandHandler {
    ctx: Arc<ServerContext>,
}

impl GeneralCommandHandler {
    pub fn new(ctx: Arc<ServerContext>) -> Self {
        Self { ctx }
    }

    pub fn handle(&self, request: &CommandHeader, payload: Vec<u8>) -> Result<Response> {
        match GeneralCommand::decode(request.direction(), request.command_id) {
            GeneralCommand::Get(cmd) => self.get(cmd, request, payload),
            GeneralCommand::Set(cmd) => {
                self.set(cmd, request, &payload)?;
                Ok(Response::Silent)
            }
            GeneralCommand::Unknown(Direction::Get, id) => {
                tracing::warn!("Unknown general GET {}", id);
                Ok(Response::empty(request))
            }
            GeneralCommand::Unknown(Direction::Set, id) => {
                tracing::warn!("Unknown general SET {} ignored", id);
                Ok(Response::Silent)
            }
        }
    }

    fn get(&self, cmd: GeneralGet, request: &CommandHeader, payload: Vec<u8>) -> Result<Response> {
        let mut header = *request;
        let response = match cmd {
            GeneralGet::ServerVersion => {
                header.value = CommandValue::from_u32(SERVER_VERSION);
                Response::empty(&header)
            }
            GeneralGet::AliveCount => {
                header.value = CommandValue::from_u32(self.ctx.next_alive());
                Response::empty(&header)
            }
            GeneralGet::Register | GeneralGet::Memory => Response::reply(header, payload),
            GeneralGet::ImageInfo => {
                self.fill_image_info(&mut header);
                Response::empty(&header)
            }
            GeneralGet::ImageData => {
                let pixels = self
                    .fill_image_info(&mut header)
                    .and_then(|(kind, info)| self.pixels(kind, info.mem_size));
                // the header announces exactly the bytes that follow it
                header.appendix[4] = pixels.as_ref().map_or(0, |p| p.bytes().len() as u32);
                Response::Image {
                    header: Some(header),
                    pixels,
                }
            }
            GeneralGet::ImageDataOnly => {
                let pixels = self
                    .fill_image_info(&mut header)
                    .and_then(|(kind, info)| self.pixels(kind, info.mem_size));
                Response::Image {
                    header: None,
                    pixels,
                }
            }
            GeneralGet::ImagePop => Response::Packet(self.image_pop(&mut header)),
            GeneralGet::IspVersion
            | GeneralGet::ModuleEnable
            | GeneralGet::ModuleUpdate
            | GeneralGet::ControlEnable
            | GeneralGet::ExposureGain
            | GeneralGet::AwbGain
            | GeneralGet::SensorRegister => Response::empty(&header),
        };
        Ok(response)
    }

    fn set(&self, cmd: GeneralSet, request: &CommandHeader, payload: &[u8]) -> Result<()> {
        match cmd {
            GeneralSet::DebugEnable => {
                let enabled = request.value.as_u8() != 0;
                self.ctx.set_debug(enabled);
                tracing::info!("Tuning debug output {}", if enabled { "enabled" } else { "disabled" });
            }
            GeneralSet::IspStart => self.ctx.pipeline.lifecycle(LifecycleAction::Start)?,
            GeneralSet::IspStop => self.ctx.pipeline.lifecycle(LifecycleAction::Stop)?,
            GeneralSet::RestoreSetting => {
                self.ctx.registry.reset();
                tracing::info!("Cached module parameters dropped");
            }
            GeneralSet::SettingFileTransfer => self.ctx.settings_sink.store(payload),
            GeneralSet::Register
            | GeneralSet::Memory
            | GeneralSet::ModuleEnable
            | GeneralSet::ModuleUpdate
            | GeneralSet::ControlEnable
            | GeneralSet::ExposureGain
            | GeneralSet::AwbGain
            | GeneralSet::SensorRegister
            | GeneralSet::SettingFile
            | GeneralSet::DeleteSettingFile => {
                tracing::debug!("{:?} has no effect on this target", cmd);
            }
        }
        Ok(())
    }

    /// Write the metadata of the image kind named in `appendix[0]` into the
    /// header. Unsupported kinds and an unavailable pipeline leave value and
    /// appendix zeroed.
    fn fill_image_info(&self, header: &mut CommandHeader) -> Option<(ImageKind, ImageInfo)> {
        let requested = header.appendix[0];
        header.value = CommandValue::default();
        header.appendix = [0; 5];

        let kind = ImageKind::from_wire(requested)?;
        let info = match self.ctx.pipeline.image_info(kind) {
            Ok(info) => info,
            Err(e) => {
                tracing::warn!("No image information for {:?}: {}", kind, e);
                return None;
            }
        };

        header.value = CommandValue::from_u32(((info.mosaic as u32) << 16) | (requested & 0xFFFF));
        header.appendix = [info.width, info.height, info.stride, info.bit_depth, info.mem_size];
        Some((kind, info))
    }

    fn pixels(&self, kind: ImageKind, advertised: u32) -> Option<PixelPacket> {
        let frame = self.ctx.pipeline.latest_frame(kind)?;
        Some(PixelPacket::new(frame, advertised as usize))
    }

    /// Metadata and pixels in one packet; `mem_size` is zero when no frame
    /// is available
    fn image_pop(&self, header: &mut CommandHeader) -> Vec<u8> {
        let Some((kind, mut info)) = self.fill_image_info(header) else {
            return ImageInfo::default().encode().to_vec();
        };
        let Some(pixels) = self.pixels(kind, info.mem_size) else {
            info.mem_size = 0;
            return info.encode().to_vec();
        };

        let bytes = pixels.bytes();
        info.mem_size = bytes.len() as u32;
        let mut packet = Vec::with_capacity(ImageInfo::SIZE + bytes.len());
        packet.extend_from_slice(&info.encode());
        packet.extend_from_slice(bytes);
        packet
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::error::TuningError;
    use crate::params::module_id;
    use crate::pipeline::{ImageFrame, MockCameraPipeline, Mosaic};
    use crate::server::context::SettingsFileSink;
    use std::sync::Mutex;

    fn handler(pipeline: MockCameraPipeline) -> GeneralCommandHandler {
        let ctx = ServerContext::new(ServerConfig::default(), Arc::new(pipeline));
        GeneralCommandHandler::new(Arc::new(ctx))
    }

    fn raw_frame() -> ImageFrame {
        ImageFrame {
            info: ImageInfo::raw(4, 2, 8, 10, Mosaic::Gbrg),
            data: Arc::from((0u8..16).collect::<Vec<_>>()),
        }
    }

    fn streaming_pipeline() -> MockCameraPipeline {
        let mut pipeline = MockCameraPipeline::new();
        pipeline
            .expect_image_info()
            .returning(|_| Ok(raw_frame().info));
        pipeline
            .expect_latest_frame()
            .returning(|_| Some(raw_frame()));
        pipeline
    }

    fn get(id: u32) -> CommandHeader {
        CommandHeader::new(id, Direction::Get)
    }

    fn set(id: u32) -> CommandHeader {
        CommandHeader::new(id, Direction::Set)
    }

    fn reply_header(response: &Response) -> CommandHeader {
        match response {
            Response::Reply { header, .. } => *header,
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_server_version() {
        let h = handler(MockCameraPipeline::new());
        let response = h.handle(&get(1), Vec::new()).unwrap();
        assert_eq!(reply_header(&response).value.as_u32(), SERVER_VERSION);
        assert_eq!(response.payload_size(), Some(0));
    }

    #[test]
    fn test_alive_count_increments() {
        let h = handler(MockCameraPipeline::new());
        let first = reply_header(&h.handle(&get(2), Vec::new()).unwrap());
        let second = reply_header(&h.handle(&get(2), Vec::new()).unwrap());
        assert_eq!(first.value.as_u32(), 1);
        assert_eq!(second.value.as_u32(), 2);
    }

    #[test]
    fn test_register_echoes_payload() {
        let h = handler(MockCameraPipeline::new());
        let response = h.handle(&get(3), vec![9, 8, 7]).unwrap();
        match response {
            Response::Reply { payload, .. } => assert_eq!(payload, vec![9, 8, 7]),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_image_info_for_raw_dump() {
        let h = handler(streaming_pipeline());
        let mut request = get(5);
        request.appendix[0] = ImageKind::DUMP;
        let header = reply_header(&h.handle(&request, Vec::new()).unwrap());
        assert_eq!(header.value.as_u32(), (3 << 16) | ImageKind::DUMP);
        assert_eq!(header.appendix, [4, 2, 8, 10, 16]);
    }

    #[test]
    fn test_image_info_unsupported_kind_zeroed() {
        let h = handler(MockCameraPipeline::new());
        let mut request = get(5);
        request.appendix = [ImageKind::SS0, 1, 2, 3, 4];
        request.value = CommandValue::from_u64(u64::MAX);
        let header = reply_header(&h.handle(&request, Vec::new()).unwrap());
        assert_eq!(header.value.as_u64(), 0);
        assert_eq!(header.appendix, [0; 5]);
    }

    #[test]
    fn test_image_info_pipeline_unavailable() {
        let mut pipeline = MockCameraPipeline::new();
        pipeline
            .expect_image_info()
            .returning(|_| Err(TuningError::PipelineUnavailable("no format".into())));
        let h = handler(pipeline);
        let mut request = get(5);
        request.appendix[0] = ImageKind::UO;
        let header = reply_header(&h.handle(&request, Vec::new()).unwrap());
        assert_eq!(header.appendix, [0; 5]);
    }

    #[test]
    fn test_image_data_header_then_pixels() {
        let h = handler(streaming_pipeline());
        let mut request = get(6);
        request.appendix[0] = ImageKind::DUMP;
        let mut out = Vec::new();
        h.handle(&request, Vec::new())
            .unwrap()
            .write_to(&mut out)
            .unwrap();

        let header = CommandHeader::decode(&out).unwrap();
        assert_eq!(header.payload_size, 0);
        assert_eq!(header.appendix[4], 16);
        assert_eq!(&out[CommandHeader::SIZE..], &(0u8..16).collect::<Vec<_>>()[..]);
    }

    #[test]
    fn test_image_data_size_matches_short_frame() {
        let mut pipeline = MockCameraPipeline::new();
        pipeline
            .expect_image_info()
            .returning(|_| Ok(ImageInfo::raw(4, 4, 8, 10, Mosaic::Gbrg)));
        pipeline
            .expect_latest_frame()
            .returning(|_| Some(raw_frame()));
        let h = handler(pipeline);
        let mut request = get(6);
        request.appendix[0] = ImageKind::DUMP;
        let mut out = Vec::new();
        h.handle(&request, Vec::new())
            .unwrap()
            .write_to(&mut out)
            .unwrap();

        let header = CommandHeader::decode(&out).unwrap();
        assert_eq!(header.appendix[1], 4);
        assert_eq!(header.appendix[4], 16);
        assert_eq!(out.len(), CommandHeader::SIZE + 16);
    }

    #[test]
    fn test_image_data_without_frame_advertises_nothing() {
        let mut pipeline = MockCameraPipeline::new();
        pipeline
            .expect_image_info()
            .returning(|_| Ok(raw_frame().info));
        pipeline.expect_latest_frame().returning(|_| None);
        let h = handler(pipeline);
        let mut request = get(6);
        request.appendix[0] = ImageKind::DUMP;
        let mut out = Vec::new();
        h.handle(&request, Vec::new())
            .unwrap()
            .write_to(&mut out)
            .unwrap();

        let header = CommandHeader::decode(&out).unwrap();
        assert_eq!(header.appendix[4], 0);
        assert_eq!(out.len(), CommandHeader::SIZE);
    }

    #[test]
    fn test_image_data_only_without_frame_sends_nothing() {
        let mut pipeline = MockCameraPipeline::new();
        pipeline
            .expect_image_info()
            .returning(|_| Ok(raw_frame().info));
        pipeline.expect_latest_frame().returning(|_| None);
        let h = handler(pipeline);
        let mut request = get(7);
        request.appendix[0] = ImageKind::DUMP;
        let mut out = Vec::new();
        h.handle(&request, Vec::new())
            .unwrap()
            .write_to(&mut out)
            .unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_image_pop_packet() {
        let h = handler(streaming_pipeline());
        let mut request = get(8);
        request.appendix[0] = ImageKind::DUMP;
        match h.handle(&request, Vec::new()).unwrap() {
            Response::Packet(bytes) => {
                assert_eq!(bytes.len(), ImageInfo::SIZE + 16);
                assert_eq!(&bytes[..ImageInfo::SIZE], &raw_frame().info.encode());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_image_pop_without_pipeline_is_zeroed_info() {
        let mut pipeline = MockCameraPipeline::new();
        pipeline
            .expect_image_info()
            .returning(|_| Err(TuningError::PipelineUnavailable("stopped".into())));
        let h = handler(pipeline);
        let mut request = get(8);
        request.appendix[0] = ImageKind::UO;
        match h.handle(&request, Vec::new()).unwrap() {
            Response::Packet(bytes) => assert_eq!(bytes, vec![0u8; ImageInfo::SIZE]),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_debug_enable_toggles_flag() {
        let pipeline = MockCameraPipeline::new();
        let ctx = Arc::new(ServerContext::new(ServerConfig::default(), Arc::new(pipeline)));
        let h = GeneralCommandHandler::new(Arc::clone(&ctx));

        let mut request = set(101);
        request.value = CommandValue::from_u32(1);
        assert!(matches!(h.handle(&request, Vec::new()).unwrap(), Response::Silent));
        assert!(ctx.debug_enabled());

        request.value = CommandValue::from_u32(0);
        h.handle(&request, Vec::new()).unwrap();
        assert!(!ctx.debug_enabled());
    }

    #[test]
    fn test_isp_start_stop_delegate_to_pipeline() {
        let mut pipeline = MockCameraPipeline::new();
        pipeline
            .expect_lifecycle()
            .withf(|a| *a == LifecycleAction::Stop)
            .times(1)
            .returning(|_| Ok(()));
        pipeline
            .expect_lifecycle()
            .withf(|a| *a == LifecycleAction::Start)
            .times(1)
            .returning(|_| Ok(()));
        let h = handler(pipeline);
        h.handle(&set(105), Vec::new()).unwrap();
        h.handle(&set(104), Vec::new()).unwrap();
    }

    #[test]
    fn test_inert_sets_do_nothing() {
        // any pipeline call would panic on the bare mock
        let h = handler(MockCameraPipeline::new());
        for id in [102, 103, 106, 107, 108, 109, 110, 111, 112, 113] {
            assert!(matches!(h.handle(&set(id), vec![1, 2]).unwrap(), Response::Silent));
        }
    }

    #[test]
    fn test_restore_setting_resets_registry() {
        let ctx = Arc::new(ServerContext::new(
            ServerConfig::default(),
            Arc::new(MockCameraPipeline::new()),
        ));
        ctx.registry.complete_probe(module_id::CFA, &[1, 2, 3]).unwrap();
        assert!(ctx.registry.is_initialized(module_id::CFA));

        GeneralCommandHandler::new(Arc::clone(&ctx))
            .handle(&set(114), Vec::new())
            .unwrap();
        assert!(!ctx.registry.is_initialized(module_id::CFA));
    }

    #[test]
    fn test_settings_file_reaches_sink() {
        #[derive(Default)]
        struct Capture(Mutex<Vec<u8>>);
        impl SettingsFileSink for Capture {
            fn store(&self, contents: &[u8]) {
                self.0.lock().unwrap().extend_from_slice(contents);
            }
        }

        let sink = Arc::new(Capture::default());
        let registry = Arc::new(crate::params::ParamRegistry::builtin());
        let ctx = ServerContext::with_parts(
            ServerConfig::default(),
            Arc::clone(&registry),
            crate::probe::ProbeRequestPool::new(registry),
            Arc::new(MockCameraPipeline::new()),
            sink.clone(),
        );
        GeneralCommandHandler::new(Arc::new(ctx))
            .handle(&set(9988), b"[ae]\nenable=1\n".to_vec())
            .unwrap();
        assert_eq!(&*sink.0.lock().unwrap(), b"[ae]\nenable=1\n");
    }

    #[test]
    fn test_unknown_general_get_is_empty_echo() {
        let h = handler(MockCameraPipeline::new());
        let response = h.handle(&get(77), vec![1, 2, 3]).unwrap();
        assert_eq!(response.payload_size(), Some(0));
    }
}
