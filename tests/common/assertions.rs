//! Custom assertion macros and utilities

/// Assert that a result is ok and return the value
#[macro_export]
macro_rules! assert_ok {
    ($result:expr) => {
        match $result {
            Ok(value) => value,
            Err(e) => panic!("Expected Ok, got Err: {:?}", e),
        }
    };
    ($result:expr, $message:expr) => {
        match $result {
            Ok(value) => value,
            Err(e) => panic!("{}: {:?}", $message, e),
        }
    };
}

/// Assert that a result is an error matching a pattern
#[macro_export]
macro_rules! assert_err {
    ($result:expr) => {
        assert!($result.is_err(), "Expected Err, got Ok");
    };
    ($result:expr, $pattern:pat) => {
        match $result {
            Err($pattern) => {}
            Ok(value) => panic!("Expected Err, got Ok: {:?}", value),
            Err(e) => panic!("Expected different error variant, got: {:?}", e),
        }
    };
}

/// Assert the contents of a sequence of chat messages
#[macro_export]
macro_rules! assert_contents {
    ($messages:expr, [$($content:expr),* $(,)?]) => {
        let actual: Vec<&str> = $messages.iter().map(|m| m.content()).collect();
        let expected: Vec<&str> = vec![$($content),*];
        pretty_assertions::assert_eq!(actual, expected);
    };
}
