use std::fmt;

/// Identity of a call site: source file, line number and function name.
///
/// Spots are the unit of accounting of the [`StackProfiler`](crate::StackProfiler).
/// Use the [`spot!`](crate::spot!) macro to capture the spot of the surrounding function.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Spot {
    file: &'static str,
    line: u32,
    function: &'static str,
}

impl Spot {
    /// Creates a spot from its parts.
    #[must_use]
    pub const fn new(file: &'static str, line: u32, function: &'static str) -> Self {
        Self {
            file,
            line,
            function,
        }
    }

    /// The source file of the call site.
    #[must_use]
    pub const fn file(&self) -> &'static str {
        self.file
    }

    /// The line number of the call site.
    #[must_use]
    pub const fn line(&self) -> u32 {
        self.line
    }

    /// The name of the function the call site belongs to.
    #[must_use]
    pub const fn function(&self) -> &'static str {
        self.function
    }
}

impl fmt::Display for Spot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} {}", self.file, self.line, self.function)
    }
}

/// Captures the [`Spot`] of the place where the macro is expanded.
///
/// Without arguments, the function name is the path of the enclosing function.
/// A function name can also be given explicitly.
///
/// ```
/// use bottleneck::spot;
///
/// fn load_config() -> bottleneck::Spot {
///     spot!()
/// }
///
/// assert!(load_config().function().ends_with("load_config"));
/// assert_eq!(spot!("parse").function(), "parse");
/// ```
#[macro_export]
macro_rules! spot {
    () => {{
        fn __spot_marker() {}
        $crate::Spot::new(
            ::std::file!(),
            ::std::line!(),
            $crate::function_name_from_marker(::std::any::type_name_of_val(&__spot_marker)),
        )
    }};
    ($function:expr) => {
        $crate::Spot::new(::std::file!(), ::std::line!(), $function)
    };
}

/// Turns the type name of the marker function declared by [`spot!`](crate::spot!)
/// into the path of the function that encloses the marker.
#[doc(hidden)]
#[must_use]
pub fn function_name_from_marker(marker_type_name: &'static str) -> &'static str {
    marker_type_name
        .strip_suffix("::__spot_marker")
        .unwrap_or(marker_type_name)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn display_is_file_line_function() {
        let spot = Spot::new("src/main.rs", 12, "main");
        assert_eq!(spot.to_string(), "src/main.rs:12 main");
    }

    #[test]
    fn macro_captures_enclosing_function() {
        let spot = crate::spot!();

        assert_eq!(spot.file(), file!());
        assert!(
            spot.function()
                .ends_with("macro_captures_enclosing_function"),
            "unexpected function name {}",
            spot.function()
        );
    }

    #[test]
    fn macro_accepts_explicit_name() {
        let spot = crate::spot!("custom");
        assert_eq!(spot.function(), "custom");
    }

    #[test]
    fn marker_suffix_is_stripped() {
        assert_eq!(
            function_name_from_marker("app::handlers::serve::__spot_marker"),
            "app::handlers::serve"
        );
        assert_eq!(function_name_from_marker("unrelated"), "unrelated");
    }

    #[test]
    fn spots_differ_by_line() {
        let first = Spot::new("a.rs", 1, "f");
        let second = Spot::new("a.rs", 2, "f");
        assert_ne!(first, second);
    }
}
