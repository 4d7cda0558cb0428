use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Coords {
    pub x: u32,
    pub y: u32,
}

impl Extent {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn square(side: u32) -> Self {
        Self::new(side, side)
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Size of the same area at a pyramid level `factor` times coarser, rounded down.
    pub fn reduced_by(&self, factor: u32) -> Self {
        Self {
            width: self.width / factor,
            height: self.height / factor,
        }
    }

    /// Whether this extent is smaller than `nominal` in either dimension.
    pub fn falls_short_of(&self, nominal: Extent) -> bool {
        self.width < nominal.width || self.height < nominal.height
    }
}

impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Matches the (width, height) tuple notation used in the run logs
        write!(f, "({}, {})", self.width, self.height)
    }
}

impl fmt::Display for Coords {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_reduced_by_rounds_down() {
        let extent = Extent::new(1000, 37);
        assert_eq!(extent.reduced_by(16), Extent::new(62, 2));
        assert_eq!(Extent::new(15, 15).reduced_by(16), Extent::new(0, 0));
    }

    #[test]
    fn test_falls_short_of() {
        let nominal = Extent::square(1024);
        assert!(!Extent::square(1024).falls_short_of(nominal));
        assert!(Extent::new(1024, 512).falls_short_of(nominal));
        assert!(Extent::new(3, 1024).falls_short_of(nominal));
    }
}
