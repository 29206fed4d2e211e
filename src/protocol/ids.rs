//! Command id namespace and general command ids

use super::header::Direction;

/// Base of the general command range
pub const GENERAL_BASE: u32 = 0;
/// Base of the per-module ISP parameter range
pub const ISP_BASE: u32 = 10_000;
/// Base of the ISP post-processing range (reserved)
pub const ISPOST_BASE: u32 = 20_000;
/// Base of the encoder range (reserved)
pub const ENCODER_BASE: u32 = 30_000;
/// Width of each id range
pub const RANGE_WIDTH: u32 = 10_000;

/// Server protocol version reported by `SERVER_VERSION` (major.minor in the
/// high and low halves)
pub const SERVER_VERSION: u32 = 0x0001_0000;

/// Which part of the id space a command falls into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandSpace {
    General(u32),
    /// Module id relative to [`ISP_BASE`]
    Isp(u32),
    Reserved(u32),
    Unknown(u32),
}

impl CommandSpace {
    pub fn classify(command_id: u32) -> Self {
        match command_id {
            id if id < ISP_BASE => CommandSpace::General(id),
            id if id < ISPOST_BASE => CommandSpace::Isp(id - ISP_BASE),
            id if id < ENCODER_BASE + RANGE_WIDTH => CommandSpace::Reserved(id),
            id => CommandSpace::Unknown(id),
        }
    }
}

/// Build the wire command id for an ISP module id
pub const fn isp_command(module_id: u32) -> u32 {
    ISP_BASE + module_id
}

// ============================================================================
// General commands
// ============================================================================

/// General GET commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneralGet {
    ServerVersion,
    AliveCount,
    Register,
    Memory,
    ImageInfo,
    ImageData,
    ImageDataOnly,
    ImagePop,
    IspVersion,
    ModuleEnable,
    ModuleUpdate,
    ControlEnable,
    ExposureGain,
    AwbGain,
    SensorRegister,
}

impl GeneralGet {
    pub fn from_id(id: u32) -> Option<Self> {
        Some(match id {
            1 => GeneralGet::ServerVersion,
            2 => GeneralGet::AliveCount,
            3 => GeneralGet::Register,
            4 => GeneralGet::Memory,
            5 => GeneralGet::ImageInfo,
            6 => GeneralGet::ImageData,
            7 => GeneralGet::ImageDataOnly,
            8 => GeneralGet::ImagePop,
            9 => GeneralGet::IspVersion,
            10 => GeneralGet::ModuleEnable,
            11 => GeneralGet::ModuleUpdate,
            12 => GeneralGet::ControlEnable,
            13 => GeneralGet::ExposureGain,
            14 => GeneralGet::AwbGain,
            15 => GeneralGet::SensorRegister,
            _ => return None,
        })
    }

    pub fn id(self) -> u32 {
        match self {
            GeneralGet::ServerVersion => 1,
            GeneralGet::AliveCount => 2,
            GeneralGet::Register => 3,
            GeneralGet::Memory => 4,
            GeneralGet::ImageInfo => 5,
            GeneralGet::ImageData => 6,
            GeneralGet::ImageDataOnly => 7,
            GeneralGet::ImagePop => 8,
            GeneralGet::IspVersion => 9,
            GeneralGet::ModuleEnable => 10,
            GeneralGet::ModuleUpdate => 11,
            GeneralGet::ControlEnable => 12,
            GeneralGet::ExposureGain => 13,
            GeneralGet::AwbGain => 14,
            GeneralGet::SensorRegister => 15,
        }
    }
}

/// General SET commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneralSet {
    DebugEnable,
    Register,
    Memory,
    IspStart,
    IspStop,
    ModuleEnable,
    ModuleUpdate,
    ControlEnable,
    ExposureGain,
    AwbGain,
    SensorRegister,
    SettingFile,
    DeleteSettingFile,
    RestoreSetting,
    /// Switches the connection into the file-transfer sub-protocol
    SettingFileTransfer,
}

impl GeneralSet {
    pub fn from_id(id: u32) -> Option<Self> {
        Some(match id {
            101 => GeneralSet::DebugEnable,
            102 => GeneralSet::Register,
            103 => GeneralSet::Memory,
            104 => GeneralSet::IspStart,
            105 => GeneralSet::IspStop,
            106 => GeneralSet::ModuleEnable,
            107 => GeneralSet::ModuleUpdate,
            108 => GeneralSet::ControlEnable,
            109 => GeneralSet::ExposureGain,
            110 => GeneralSet::AwbGain,
            111 => GeneralSet::SensorRegister,
            112 => GeneralSet::SettingFile,
            113 => GeneralSet::DeleteSettingFile,
            114 => GeneralSet::RestoreSetting,
            FILE_TRANSFER_COMMAND => GeneralSet::SettingFileTransfer,
            _ => return None,
        })
    }

    pub fn id(self) -> u32 {
        match self {
            GeneralSet::DebugEnable => 101,
            GeneralSet::Register => 102,
            GeneralSet::Memory => 103,
            GeneralSet::IspStart => 104,
            GeneralSet::IspStop => 105,
            GeneralSet::ModuleEnable => 106,
            GeneralSet::ModuleUpdate => 107,
            GeneralSet::ControlEnable => 108,
            GeneralSet::ExposureGain => 109,
            GeneralSet::AwbGain => 110,
            GeneralSet::SensorRegister => 111,
            GeneralSet::SettingFile => 112,
            GeneralSet::DeleteSettingFile => 113,
            GeneralSet::RestoreSetting => 114,
            GeneralSet::SettingFileTransfer => FILE_TRANSFER_COMMAND,
        }
    }
}

/// Command id reserved for the settings file transfer
pub const FILE_TRANSFER_COMMAND: u32 = 9988;

/// A decoded general command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneralCommand {
    Get(GeneralGet),
    Set(GeneralSet),
    Unknown(Direction, u32),
}

impl GeneralCommand {
    /// Dispatch key is (direction, id)
    pub fn decode(direction: Direction, id: u32) -> Self {
        match direction {
            Direction::Get => GeneralGet::from_id(id)
                .map(GeneralCommand::Get)
                .unwrap_or(GeneralCommand::Unknown(direction, id)),
            Direction::Set => GeneralSet::from_id(id)
                .map(GeneralCommand::Set)
                .unwrap_or(GeneralCommand::Unknown(direction, id)),
        }
    }
}
