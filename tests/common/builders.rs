//! Test data builders for creating request headers

use stf_tuning_server::protocol::ids::isp_command;
use stf_tuning_server::protocol::{CommandHeader, CommandType, CommandValue, Direction, ParamWord};

/// Builder for request headers
pub struct HeaderBuilder {
    command_id: u32,
    direction: Direction,
    command_type: CommandType,
    value: CommandValue,
    appendix: [u32; 5],
}

impl HeaderBuilder {
    pub fn new(command_id: u32) -> Self {
        Self {
            command_id,
            direction: Direction::Get,
            command_type: CommandType::Single,
            value: CommandValue::default(),
            appendix: [0; 5],
        }
    }

    /// Request for an ISP module or control id
    pub fn isp(module_id: u32) -> Self {
        Self::new(isp_command(module_id))
    }

    pub fn get(mut self) -> Self {
        self.direction = Direction::Get;
        self
    }

    pub fn set(mut self) -> Self {
        self.direction = Direction::Set;
        self
    }

    pub fn command_type(mut self, command_type: CommandType) -> Self {
        self.command_type = command_type;
        self
    }

    pub fn value_u32(mut self, value: u32) -> Self {
        self.value = CommandValue::from_u32(value);
        self
    }

    pub fn appendix(mut self, index: usize, value: u32) -> Self {
        self.appendix[index] = value;
        self
    }

    pub fn build(self) -> CommandHeader {
        CommandHeader {
            command_id: self.command_id,
            param: ParamWord::new(self.direction, self.command_type),
            value: self.value,
            appendix: self.appendix,
            ..CommandHeader::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_builder() {
        let header = HeaderBuilder::isp(24)
            .set()
            .value_u32(7)
            .appendix(0, 0x8)
            .build();

        assert_eq!(header.command_id, 10_024);
        assert_eq!(header.direction(), Direction::Set);
        assert_eq!(header.value.as_u32(), 7);
        assert_eq!(header.appendix[0], 0x8);
    }
}
