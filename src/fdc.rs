/// Floppy Disk Controller (FDC) status register definitions
///
/// EDSK records the ST1 and ST2 registers the controller reported when the
/// sector was imaged. The flags here follow the meanings the container
/// assigns to each bit.

use std::fmt;

/// FDC Status Register 1 (ST1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FdcStatus1(pub u8);

impl FdcStatus1 {
    /// End of Cylinder (EN) - Bit 7
    /// Set when the FDC ran past the final sector of the track
    pub const EN: u8 = 0x80;

    /// Data Error in ID (DE) - Bit 5
    /// Set when a CRC error occurs in the ID field
    pub const DE: u8 = 0x20;

    /// No Data (ND) - Bit 2
    /// Set if the FDC cannot find the specified sector
    pub const ND: u8 = 0x04;

    /// Not Writable (NW) - Bit 1
    /// Set during a write if the disk is write-protected
    pub const NW: u8 = 0x02;

    /// Missing Address Mark (MA) - Bit 0
    /// Set if the FDC does not detect an ID address mark
    pub const MA: u8 = 0x01;

    /// Create a new FdcStatus1 from a raw byte
    #[inline]
    pub fn new(value: u8) -> Self {
        FdcStatus1(value)
    }

    /// Check if end of cylinder bit is set
    #[inline]
    pub fn end_of_cylinder(&self) -> bool {
        (self.0 & Self::EN) != 0
    }

    /// Check if the ID-field data error bit is set
    #[inline]
    pub fn data_error(&self) -> bool {
        (self.0 & Self::DE) != 0
    }

    /// Check if no data bit is set
    #[inline]
    pub fn no_data(&self) -> bool {
        (self.0 & Self::ND) != 0
    }

    /// Check if not writable bit is set
    #[inline]
    pub fn not_writable(&self) -> bool {
        (self.0 & Self::NW) != 0
    }

    /// Check if missing address mark bit is set
    #[inline]
    pub fn missing_address_mark(&self) -> bool {
        (self.0 & Self::MA) != 0
    }

    /// Check if any flag is set
    #[inline]
    pub fn has_error(&self) -> bool {
        self.0 != 0
    }

    /// Names of the flags currently set
    pub fn flags(&self) -> Vec<&'static str> {
        let mut flags = Vec::new();
        if self.end_of_cylinder() {
            flags.push("end-of-cylinder");
        }
        if self.data_error() {
            flags.push("data-error-in-id");
        }
        if self.no_data() {
            flags.push("no-data");
        }
        if self.not_writable() {
            flags.push("not-writable");
        }
        if self.missing_address_mark() {
            flags.push("missing-address-mark");
        }
        flags
    }
}

impl fmt::Display for FdcStatus1 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            write!(f, "OK")
        } else {
            write!(f, "{}", self.flags().join("|"))
        }
    }
}

/// FDC Status Register 2 (ST2)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FdcStatus2(pub u8);

impl FdcStatus2 {
    /// Control Mark (CM) - Bit 6
    /// Set if a sector with a deleted data address mark was read
    pub const CM: u8 = 0x40;

    /// Data Error in Data Field (DD) - Bit 5
    /// Set when a CRC error occurs in the data field
    pub const DD: u8 = 0x20;

    /// Wrong Cylinder (WC) - Bit 2
    /// Set if the cylinder address in the ID field does not match
    pub const WC: u8 = 0x04;

    /// Bad Cylinder (BC) - Bit 1
    /// Set if the cylinder address carries the bad-track mark
    pub const BC: u8 = 0x02;

    /// Missing Address Mark in Data Field (MD) - Bit 0
    /// Set if no data address mark is found
    pub const MD: u8 = 0x01;

    /// Create a new FdcStatus2 from a raw byte
    #[inline]
    pub fn new(value: u8) -> Self {
        FdcStatus2(value)
    }

    /// Check if control mark (deleted data) bit is set
    #[inline]
    pub fn control_mark(&self) -> bool {
        (self.0 & Self::CM) != 0
    }

    /// Check if data field error bit is set
    #[inline]
    pub fn data_field_error(&self) -> bool {
        (self.0 & Self::DD) != 0
    }

    /// Check if wrong cylinder bit is set
    #[inline]
    pub fn wrong_cylinder(&self) -> bool {
        (self.0 & Self::WC) != 0
    }

    /// Check if bad cylinder bit is set
    #[inline]
    pub fn bad_cylinder(&self) -> bool {
        (self.0 & Self::BC) != 0
    }

    /// Check if missing data mark bit is set
    #[inline]
    pub fn missing_data_mark(&self) -> bool {
        (self.0 & Self::MD) != 0
    }

    /// Check if any flag is set
    #[inline]
    pub fn has_error(&self) -> bool {
        self.0 != 0
    }

    /// Names of the flags currently set
    pub fn flags(&self) -> Vec<&'static str> {
        let mut flags = Vec::new();
        if self.control_mark() {
            flags.push("control-mark");
        }
        if self.data_field_error() {
            flags.push("data-error-in-data");
        }
        if self.wrong_cylinder() {
            flags.push("wrong-cylinder");
        }
        if self.bad_cylinder() {
            flags.push("bad-cylinder");
        }
        if self.missing_data_mark() {
            flags.push("missing-data-mark");
        }
        flags
    }
}

impl fmt::Display for FdcStatus2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            write!(f, "OK")
        } else {
            write!(f, "{}", self.flags().join("|"))
        }
    }
}
