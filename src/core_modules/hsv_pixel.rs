// THEORY (1D Pixel Heuristics):
// The `hsv_pixel` module is the most fundamental unit of the segmenter. It is a
// "dumb" container for a single RGB pixel plus the handful of single-pixel
// heuristics the fire-color test needs. Nothing here reads neighbors in space or
// history in time; masks, morphology and motion live in higher modules.
//
// The fire table is expressed on the compact 8-bit HSV scale used by most video
// tooling: hue in [0, 180) (degrees halved so it fits a byte), saturation and
// value in [0, 255]. Every conversion below lands on that scale, rounded to the
// nearest integer, so a configured band means the same thing it would in any
// other 8-bit HSV pipeline.

pub mod pixel {
    pub type Channel = u8;
    pub type Hue = f32;
    pub type Chroma = f32;
    pub type Gray = u8;

    /// Rec. 601 luma weights, used for the motion difference image.
    const LUMA_RED: f32 = 0.299;
    const LUMA_GREEN: f32 = 0.587;
    const LUMA_BLUE: f32 = 0.114;

    /// A "dumb" data container representing a single RGB pixel.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Pixel {
        pub red: Channel,
        pub green: Channel,
        pub blue: Channel,
    }

    impl From<image::Rgb<u8>> for Pixel {
        fn from(rgb: image::Rgb<u8>) -> Self {
            Pixel::new(rgb.0[0], rgb.0[1], rgb.0[2])
        }
    }

    impl Pixel {
        pub fn new(red: Channel, green: Channel, blue: Channel) -> Self {
            Pixel { red, green, blue }
        }

        #[inline]
        fn max_channel(&self) -> Channel {
            self.red.max(self.green.max(self.blue))
        }

        #[inline]
        fn min_channel(&self) -> Channel {
            self.red.min(self.green.min(self.blue))
        }

        /// Chroma (max - min) in 0..255.
        pub fn chroma(&self) -> Chroma {
            (self.max_channel() - self.min_channel()) as Chroma
        }

        /// Hue angle in degrees [0, 360). Achromatic pixels report 0.
        pub fn hue_degrees(&self) -> Hue {
            let maximum_channel = self.max_channel() as f32;
            let chroma = self.chroma();
            if chroma <= 0.0 {
                return 0.0;
            }

            let (r, g, b) = (self.red as f32, self.green as f32, self.blue as f32);
            let (base_difference, sector_offset) = if maximum_channel == r {
                (g - b, 0.0)
            } else if maximum_channel == g {
                (b - r, 2.0)
            } else {
                (r - g, 4.0)
            };

            let mut hue_degrees = (base_difference / chroma + sector_offset) * 60.0;
            if hue_degrees < 0.0 {
                hue_degrees += 360.0;
            }
            hue_degrees
        }

        /// Hue on the 8-bit scale, [0, 180).
        pub fn hue_byte(&self) -> Channel {
            let hue = (self.hue_degrees() / 2.0).round() as u16;
            if hue >= 180 { 0 } else { hue as Channel }
        }

        /// HSV saturation on the 8-bit scale (chroma / value * 255).
        pub fn saturation_byte(&self) -> Channel {
            let value = self.max_channel();
            if value == 0 {
                return 0;
            }
            (self.chroma() * 255.0 / value as f32).round().min(255.0) as Channel
        }

        /// HSV value: the brightest channel.
        pub fn value_byte(&self) -> Channel {
            self.max_channel()
        }

        /// `[hue, saturation, value]` on the 8-bit scale.
        pub fn hsv(&self) -> [Channel; 3] {
            [self.hue_byte(), self.saturation_byte(), self.value_byte()]
        }

        /// Rec. 601 gray level, rounded.
        pub fn gray(&self) -> Gray {
            (LUMA_RED * self.red as f32 + LUMA_GREEN * self.green as f32 + LUMA_BLUE * self.blue as f32)
                .round()
                .min(255.0) as Gray
        }

        /// Channel-wise absolute difference between two pixels.
        pub fn abs_diff(&self, other: &Pixel) -> Pixel {
            Pixel {
                red: self.red.abs_diff(other.red),
                green: self.green.abs_diff(other.green),
                blue: self.blue.abs_diff(other.blue),
            }
        }
    }
}
