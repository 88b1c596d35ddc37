//! Settings loading tests
//!
//! Covers TOML parsing, defaults for missing keys, validation failures and
//! the character set names accepted in settings files.

mod charset_tests {
    use std::str::FromStr;
    use vmdbg_config::Charset;

    #[test]
    fn test_charset_from_str() {
        assert_eq!(Charset::from_str("ascii").unwrap(), Charset::Ascii);
        assert_eq!(Charset::from_str("ISO-8859-1").unwrap(), Charset::Latin1);
        assert_eq!(Charset::from_str("utf-8").unwrap(), Charset::Utf8);
        assert!(Charset::from_str("ebcdic").is_err());
    }

    #[test]
    fn test_charset_display_round_trip() {
        for charset in [Charset::Ascii, Charset::Latin1, Charset::Utf8] {
            let text = charset.to_string();
            assert_eq!(Charset::from_str(&text).unwrap(), charset);
        }
    }
}

mod settings_tests {
    use std::io::Write;
    use vmdbg_config::{Charset, ConfigError, DebuggerSettings, MAX_BREAKPOINTS};

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings = DebuggerSettings::from_toml_str(
            r#"
            max_breakpoints = 2
            ui_charset = "ascii"

            [engine]
            max_instructions = 50
            "#,
        )
        .unwrap();

        assert_eq!(settings.max_breakpoints, 2);
        assert_eq!(settings.ui_charset, Charset::Ascii);
        assert_eq!(settings.engine.max_instructions, 50);
        // Untouched keys fall back to the defaults
        assert_eq!(settings.stack_line_buffer_size, 256);
        assert!(settings.source_in_stack_listing);
    }

    #[test]
    fn test_zero_breakpoints_rejected() {
        let err = DebuggerSettings::from_toml_str("max_breakpoints = 0").unwrap_err();
        match err {
            ConfigError::Invalid { name, .. } => assert_eq!(name, "max_breakpoints"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_malformed_toml_rejected() {
        let err = DebuggerSettings::from_toml_str("max_breakpoints = [").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "dynamic_code_page_size = 512").unwrap();

        let settings = DebuggerSettings::load(file.path()).unwrap();
        assert_eq!(settings.dynamic_code_page_size, 512);
        assert_eq!(settings.max_breakpoints, MAX_BREAKPOINTS);
    }

    #[test]
    fn test_settings_serialize_to_json() {
        let settings = DebuggerSettings::default();
        let json = serde_json::to_value(&settings).unwrap();
        assert_eq!(json["max_breakpoints"], 100);
        assert_eq!(json["ui_charset"], "utf8");
    }
}
