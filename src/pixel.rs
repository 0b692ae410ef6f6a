//! Sensor pixel formats.
//!
//! Conversion itself belongs to the SDK's image processor; this module only
//! knows enough about each format to pick conversion parameters.

use std::fmt;

/// Pixel formats a Galaxy camera can deliver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    Mono8,
    Mono10,
    Mono10Packed,
    Mono10P,
    Mono12,
    Mono12Packed,
    Mono12P,
    Mono14,
    Mono14P,
    Mono16,
    Bayer8(BayerPattern),
    Bayer10(BayerPattern),
    Bayer10Packed(BayerPattern),
    Bayer10P(BayerPattern),
    Bayer12(BayerPattern),
    Bayer12Packed(BayerPattern),
    Bayer12P(BayerPattern),
    Bayer14(BayerPattern),
    Bayer14P(BayerPattern),
    Bayer16(BayerPattern),
    Rgb8,
    Bgr8,
    R8,
    G8,
    B8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BayerPattern {
    Gr,
    Rg,
    Gb,
    Bg,
}

impl BayerPattern {
    fn symbolic(self) -> &'static str {
        match self {
            BayerPattern::Gr => "GR",
            BayerPattern::Rg => "RG",
            BayerPattern::Gb => "GB",
            BayerPattern::Bg => "BG",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "GR" => Some(BayerPattern::Gr),
            "RG" => Some(BayerPattern::Rg),
            "GB" => Some(BayerPattern::Gb),
            "BG" => Some(BayerPattern::Bg),
            _ => None,
        }
    }
}

/// Window of significant bits the converter keeps when reducing a deep
/// format to 8 bits per channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValidBits {
    Bit0To7,
    Bit2To9,
    Bit4To11,
    Bit6To13,
    Bit8To15,
}

impl ValidBits {
    /// Right shift that maps the window onto 0..=7.
    pub fn shift(self) -> u32 {
        match self {
            ValidBits::Bit0To7 => 0,
            ValidBits::Bit2To9 => 2,
            ValidBits::Bit4To11 => 4,
            ValidBits::Bit6To13 => 6,
            ValidBits::Bit8To15 => 8,
        }
    }
}

impl PixelFormat {
    /// Significant bits per sample.
    pub fn bit_depth(self) -> u32 {
        use PixelFormat::*;
        match self {
            Mono8 | Bayer8(_) | Rgb8 | Bgr8 | R8 | G8 | B8 => 8,
            Mono10 | Mono10Packed | Mono10P | Bayer10(_) | Bayer10Packed(_) | Bayer10P(_) => 10,
            Mono12 | Mono12Packed | Mono12P | Bayer12(_) | Bayer12Packed(_) | Bayer12P(_) => 12,
            Mono14 | Mono14P | Bayer14(_) | Bayer14P(_) => 14,
            Mono16 | Bayer16(_) => 16,
        }
    }

    /// Mono sensors (and single-channel outputs) cannot produce color.
    pub fn is_gray(self) -> bool {
        use PixelFormat::*;
        matches!(
            self,
            Mono8
                | Mono10
                | Mono10Packed
                | Mono10P
                | Mono12
                | Mono12Packed
                | Mono12P
                | Mono14
                | Mono14P
                | Mono16
                | R8
                | G8
                | B8
        )
    }

    pub fn is_bayer(self) -> bool {
        self.bayer_pattern().is_some()
    }

    pub fn bayer_pattern(self) -> Option<BayerPattern> {
        use PixelFormat::*;
        match self {
            Bayer8(p) | Bayer10(p) | Bayer10Packed(p) | Bayer10P(p) | Bayer12(p)
            | Bayer12Packed(p) | Bayer12P(p) | Bayer14(p) | Bayer14P(p) | Bayer16(p) => Some(p),
            _ => None,
        }
    }

    /// Bit-packed layouts (several samples share bytes).
    pub fn is_packed(self) -> bool {
        use PixelFormat::*;
        matches!(
            self,
            Mono10Packed
                | Mono10P
                | Mono12Packed
                | Mono12P
                | Mono14P
                | Bayer10Packed(_)
                | Bayer10P(_)
                | Bayer12Packed(_)
                | Bayer12P(_)
                | Bayer14P(_)
        )
    }

    /// Bytes per sample for unpacked layouts.
    pub fn bytes_per_sample(self) -> Option<usize> {
        if self.is_packed() {
            None
        } else if self.bit_depth() > 8 {
            Some(2)
        } else {
            Some(1)
        }
    }

    /// Channels per pixel as delivered.
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Rgb8 | PixelFormat::Bgr8 => 3,
            _ => 1,
        }
    }

    /// The bit window that keeps the most significant 8 bits of the sample.
    pub fn best_valid_bits(self) -> ValidBits {
        match self.bit_depth() {
            10 => ValidBits::Bit2To9,
            12 => ValidBits::Bit4To11,
            14 => ValidBits::Bit6To13,
            16 => ValidBits::Bit8To15,
            _ => ValidBits::Bit0To7,
        }
    }

    /// GenICam `PixelFormat` enum symbolic.
    pub fn symbolic(self) -> String {
        use PixelFormat::*;
        match self {
            Mono8 => "Mono8".into(),
            Mono10 => "Mono10".into(),
            Mono10Packed => "Mono10Packed".into(),
            Mono10P => "Mono10p".into(),
            Mono12 => "Mono12".into(),
            Mono12Packed => "Mono12Packed".into(),
            Mono12P => "Mono12p".into(),
            Mono14 => "Mono14".into(),
            Mono14P => "Mono14p".into(),
            Mono16 => "Mono16".into(),
            Bayer8(p) => format!("Bayer{}8", p.symbolic()),
            Bayer10(p) => format!("Bayer{}10", p.symbolic()),
            Bayer10Packed(p) => format!("Bayer{}10Packed", p.symbolic()),
            Bayer10P(p) => format!("Bayer{}10p", p.symbolic()),
            Bayer12(p) => format!("Bayer{}12", p.symbolic()),
            Bayer12Packed(p) => format!("Bayer{}12Packed", p.symbolic()),
            Bayer12P(p) => format!("Bayer{}12p", p.symbolic()),
            Bayer14(p) => format!("Bayer{}14", p.symbolic()),
            Bayer14P(p) => format!("Bayer{}14p", p.symbolic()),
            Bayer16(p) => format!("Bayer{}16", p.symbolic()),
            Rgb8 => "RGB8".into(),
            Bgr8 => "BGR8".into(),
            R8 => "R8".into(),
            G8 => "G8".into(),
            B8 => "B8".into(),
        }
    }

    /// Parse a GenICam `PixelFormat` symbolic.
    pub fn from_symbolic(s: &str) -> Option<Self> {
        use PixelFormat::*;
        let fixed = match s {
            "Mono8" => Some(Mono8),
            "Mono10" => Some(Mono10),
            "Mono10Packed" => Some(Mono10Packed),
            "Mono10p" => Some(Mono10P),
            "Mono12" => Some(Mono12),
            "Mono12Packed" => Some(Mono12Packed),
            "Mono12p" => Some(Mono12P),
            "Mono14" => Some(Mono14),
            "Mono14p" => Some(Mono14P),
            "Mono16" => Some(Mono16),
            "RGB8" | "RGB8Packed" => Some(Rgb8),
            "BGR8" | "BGR8Packed" => Some(Bgr8),
            "R8" => Some(R8),
            "G8" => Some(G8),
            "B8" => Some(B8),
            _ => None,
        };
        if fixed.is_some() {
            return fixed;
        }

        let rest = s.strip_prefix("Bayer")?;
        if rest.len() < 3 {
            return None;
        }
        let (pattern, depth) = rest.split_at(2);
        let pattern = BayerPattern::parse(pattern)?;
        match depth {
            "8" => Some(Bayer8(pattern)),
            "10" => Some(Bayer10(pattern)),
            "10Packed" => Some(Bayer10Packed(pattern)),
            "10p" => Some(Bayer10P(pattern)),
            "12" => Some(Bayer12(pattern)),
            "12Packed" => Some(Bayer12Packed(pattern)),
            "12p" => Some(Bayer12P(pattern)),
            "14" => Some(Bayer14(pattern)),
            "14p" => Some(Bayer14P(pattern)),
            "16" => Some(Bayer16(pattern)),
            _ => None,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.symbolic())
    }
}
