pub const MCP9808_ADDRESS: u8 = 0x18;
pub const MCP9808_TEMP_REGISTER: u8 = 0x05;
const MCP9808_SIGN_BIT: u8 = 0x10;

pub const DS18B20_FAMILY_PREFIX: &str = "28";

pub fn decode_mcp9808(raw: [u8; 2]) -> f64 {
    let [high, low] = raw;
    let magnitude = f64::from(high & 0x1F) * 16.0 + f64::from(low) / 16.0;
    if high & MCP9808_SIGN_BIT != 0 {
        magnitude - 256.0
    } else {
        magnitude
    }
}

// The second line ends with `t=<millidegrees>`.
pub fn parse_w1_slave(contents: &str) -> Option<f64> {
    let line = contents.lines().nth(1)?;
    let pos = line.find("t=")?;
    let millis: i64 = line[pos + 2..].trim().parse().ok()?;
    Some(millis as f64 / 1000.0)
}

pub fn round_1dp(value: f64) -> f64 {
    (value * 10.0).round_ties_even() / 10.0
}

pub fn apply_correction(raw_celsius: f64, correction: f64) -> f64 {
    round_1dp(raw_celsius + correction)
}
