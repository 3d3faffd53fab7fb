use std::fmt;
use std::ops::{Bound, Range, RangeBounds};

pub type BoundPair<T> = (Bound<T>, Bound<T>);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeError<E> {
    MissingDots(String),
    Bound(E),
}

impl<E: fmt::Display> fmt::Display for RangeError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RangeError::MissingDots(s) => write!(f, "could not find '..' when parsing range `{s}`"),
            RangeError::Bound(e)       => write!(f, "bad range bound: {e}"),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for RangeError<E> {}

fn split_dots<E>(s: &str) -> Result<(&str, &str), RangeError<E>> {
    s.split_once("..").ok_or_else(|| RangeError::MissingDots(s.into()))
}

/// Parse `a..b`, `a..`, `..b` or `..` into a pair of bounds
pub fn parse_bounds<T: std::str::FromStr>(s: &str) -> Result<BoundPair<T>, RangeError<<T as std::str::FromStr>::Err>> {
    let (x, y) = split_dots(s)?;
    Ok((option_to_included(parse_if_not_empty(x).map_err(RangeError::Bound)?),
        option_to_excluded(parse_if_not_empty(y).map_err(RangeError::Bound)?)))
}

fn option_to_included<T>(x: Option<T>) -> Bound<T> {
    if let Some(y) = x { Bound::Included(y) }
    else               { Bound::Unbounded }
}

fn option_to_excluded<T>(x: Option<T>) -> Bound<T> {
    if let Some(y) = x { Bound::Excluded(y) }
    else               { Bound::Unbounded }
}

fn parse_if_not_empty<T: std::str::FromStr>(s: &str) -> Result<Option<T>, <T as std::str::FromStr>::Err> {
    Ok(if s.is_empty() { None }
       else            { Some(s.parse()?) })
}

/// Concrete index range selected by `bounds` within `0..len`
pub fn clamp_bounds(bounds: &BoundPair<usize>, len: usize) -> Range<usize> {
    let start = match bounds.start_bound() {
        Bound::Included(&n) => n,
        Bound::Excluded(&n) => n + 1,
        Bound::Unbounded    => 0,
    };
    let end = match bounds.end_bound() {
        Bound::Included(&n) => n + 1,
        Bound::Excluded(&n) => n,
        Bound::Unbounded    => len,
    };
    let end = end.min(len);
    start.min(end)..end
}

/// Group numeric digits to facilitate reading long numbers
pub fn group_digits<F: std::fmt::Display>(n: F) -> String {
    use numsep::{separate, Locale};
    separate(n, Locale::English)
}


pub mod timing {

    use super::group_digits;
    use std::time::Instant;
    use std::io::Write;

    pub struct Progress {
        previous: Instant,
    }

    impl Progress {

        #[allow(clippy::new_without_default)]
        pub fn new() -> Self { Self { previous: Instant::now() } }

        /// Print message, append ellipsis, flush stdout, stay on same line, start timer.
        pub fn start(&mut self, message: &str) {
            print!("{message} ... ");
            let _ = std::io::stdout().flush();
            self.start_timer();
        }

        /// Print message, go to next line, start timer
        pub fn startln(&mut self, message: &str) {
            self.start(message);
            println!();
            self.start_timer();
        }

        // Print time elapsed since last start or done
        pub fn done(&mut self) {
            println!("{} ms", group_digits(self.previous.elapsed().as_millis()));
            self.start_timer();
        }

        // Print message followed by time elapsed since last start or done
        pub fn done_with_message(&mut self, message: &str) {
            println!("{message}: {} ms",
                     group_digits(self.previous.elapsed().as_millis()));
            self.start_timer();
        }

        fn start_timer(&mut self) { self.previous = Instant::now() }
    }
}
