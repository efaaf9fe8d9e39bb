use itertools::Itertools;

/// Renders a duration with the two most significant units, for example `3s 140ms` or `12ms 5us`.
pub fn show_duration(duration: std::time::Duration) -> String {
    let us = duration.as_micros();
    let ms = duration.as_millis();
    let s = duration.as_secs();
    let m = s / 60;
    let h = m / 60;

    if h > 0 {
        format!("{}h {}m", h, m % 60)
    } else if m > 0 {
        format!("{}m {}s", m, s % 60)
    } else if s > 0 {
        format!("{}s {}ms", s, ms % 1000)
    } else if ms > 0 {
        format!("{}ms {}us", ms, us % 1000)
    } else {
        format!("{}us", us)
    }
}

/// Helper trait which is used to display symbols, words and outputs in log messages and
/// tables. The representation should be short, a word over characters for example is shown
/// as the characters written next to each other.
pub trait Show {
    /// Returns a human readable representation of `self`.
    fn show(&self) -> String;

    /// Shows a sequence of elements. The default separates the individual elements by
    /// commas and encloses them in brackets, symbol types override this so that words are
    /// displayed compactly. An empty sequence is shown as `ε`.
    fn show_collection<'a, I>(iter: I) -> String
    where
        Self: 'a,
        I: IntoIterator<Item = &'a Self>,
    {
        format!("[{}]", iter.into_iter().map(|x| x.show()).join(", "))
    }
}

impl Show for char {
    fn show(&self) -> String {
        self.to_string()
    }

    fn show_collection<'a, I>(iter: I) -> String
    where
        Self: 'a,
        I: IntoIterator<Item = &'a Self>,
    {
        let out: String = iter.into_iter().collect();
        if out.is_empty() {
            "ε".to_string()
        } else {
            out
        }
    }
}

macro_rules! impl_show_for_integers {
    ($($t:ty),*) => {
        $(
            impl Show for $t {
                fn show(&self) -> String {
                    self.to_string()
                }

                fn show_collection<'a, I>(iter: I) -> String
                where
                    Self: 'a,
                    I: IntoIterator<Item = &'a Self>,
                {
                    let mut it = iter.into_iter().peekable();
                    if it.peek().is_none() {
                        return "ε".to_string();
                    }
                    it.map(|x| x.to_string()).join(".")
                }
            }
        )*
    };
}

impl_show_for_integers!(u8, u16, u32, u64, usize);

impl Show for bool {
    fn show(&self) -> String {
        match self {
            true => "+",
            false => "-",
        }
        .to_string()
    }

    fn show_collection<'a, I>(iter: I) -> String
    where
        Self: 'a,
        I: IntoIterator<Item = &'a Self>,
    {
        iter.into_iter().map(Show::show).join("")
    }
}

impl Show for String {
    fn show(&self) -> String {
        self.clone()
    }
}

impl<S: Show> Show for [S] {
    fn show(&self) -> String {
        S::show_collection(self.iter())
    }
}

impl<S: Show> Show for Vec<S> {
    fn show(&self) -> String {
        S::show_collection(self.iter())
    }
}

impl<S: Show> Show for Option<S> {
    fn show(&self) -> String {
        match self {
            Some(x) => x.show(),
            None => "?".to_string(),
        }
    }
}

impl<S: Show, T: Show> Show for (S, T) {
    fn show(&self) -> String {
        format!("({}, {})", self.0.show(), self.1.show())
    }
}

impl<S: Show + ?Sized> Show for &S {
    fn show(&self) -> String {
        S::show(*self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test]
    fn words_are_shown_compactly() {
        assert_eq!(vec!['a', 'b', 'b'].show(), "abb");
        assert_eq!(Vec::<char>::new().show(), "ε");
        assert_eq!(vec![1usize, 20].show(), "1.20");
        assert_eq!(vec![true, false].show(), "+-");
        assert_eq!(Some('a').show(), "a");
        assert_eq!(None::<char>.show(), "?");
    }

    #[test_log::test]
    fn durations() {
        use std::time::Duration;
        assert_eq!(show_duration(Duration::from_micros(17)), "17us");
        assert_eq!(show_duration(Duration::from_micros(2_005)), "2ms 5us");
        assert_eq!(show_duration(Duration::from_millis(3_140)), "3s 140ms");
        assert_eq!(show_duration(Duration::from_secs(125)), "2m 5s");
    }
}
