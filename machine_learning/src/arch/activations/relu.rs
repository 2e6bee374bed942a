/// Rectified linear unit.
#[derive(Clone, Copy, Debug, Default)]
pub struct Relu;

impl Relu {
    pub fn new() -> Self {
        Self
    }

    pub fn f(&self, z: f32) -> f32 {
        z.max(0.)
    }

    pub fn df(&self, z: f32) -> f32 {
        if z > 0. { 1. } else { 0. }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamps_negatives() {
        let relu = Relu::new();
        assert_eq!(relu.f(-3.), 0.);
        assert_eq!(relu.f(2.5), 2.5);
        assert_eq!(relu.df(-1.), 0.);
        assert_eq!(relu.df(1.), 1.);
    }
}
