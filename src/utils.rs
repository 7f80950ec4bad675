use core::convert::Infallible;

/// Helper trait to resolve Infallible Results
pub trait InfallibleResult<T> {
    fn infallible(self) -> T;
}

impl<T> InfallibleResult<T> for Result<T, Infallible> {
    fn infallible(self) -> T {
        match self {
            Ok(v) => v,
            Err(e) => match e {},
        }
    }
}

/// Direction of a cycle/step action
#[derive(Clone, Copy, PartialEq)]
#[cfg_attr(test, derive(Debug))]
pub enum Inc {
    Up,
    Down,
}

impl Inc {
    /// Step an index over a table of `len` elements, wrapping on both ends
    pub fn wrapping_step(&self, index: usize, len: usize) -> usize {
        debug_assert!(len > 0);
        match self {
            Inc::Up => (index + 1) % len,
            Inc::Down => index.checked_sub(1).unwrap_or(len - 1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrapping_step_up() {
        assert_eq!(Inc::Up.wrapping_step(0, 3), 1);
        assert_eq!(Inc::Up.wrapping_step(1, 3), 2);
        assert_eq!(Inc::Up.wrapping_step(2, 3), 0);
    }

    #[test]
    fn wrapping_step_down() {
        assert_eq!(Inc::Down.wrapping_step(2, 3), 1);
        assert_eq!(Inc::Down.wrapping_step(1, 3), 0);
        assert_eq!(Inc::Down.wrapping_step(0, 3), 2);
    }
}
