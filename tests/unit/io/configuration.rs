//! Tests for configuration defaults, validation and memory limits

#[cfg(test)]
mod tests {
    use photomosaic::MosaicError;
    use photomosaic::io::configuration::{
        DEFAULT_LOWER_THRESH, DEFAULT_MAX_WIDTH, DEFAULT_MEM_LIMIT_MIB, MIB, MosaicConfig,
        UnfairConfig,
    };
    use photomosaic::math::colorspace::Colorspace;
    use photomosaic::math::distance::Metric;

    // Tests defaults select the fair exact policy in Lab space
    // Verified by changing the default colorspace
    #[test]
    fn test_defaults() {
        let config = MosaicConfig::default();
        assert_eq!(config.colorspace, Colorspace::Lab);
        assert_eq!(config.metric, Metric::Euclidean);
        assert_eq!(config.mem_limit_mib, DEFAULT_MEM_LIMIT_MIB);
        assert!((config.dup - 1.0).abs() < f64::EPSILON);
        assert!((config.lower_thresh - DEFAULT_LOWER_THRESH).abs() < f32::EPSILON);
        assert!(config.unfair.is_none());
        assert!(!config.greedy && !config.salient && !config.transparent && !config.gpu);

        let unfair = UnfairConfig::default();
        assert_eq!(unfair.max_width, DEFAULT_MAX_WIDTH);
        assert!(unfair.randomize);
        assert!(!unfair.dither);
        assert!(config.validate().is_ok());
    }

    // Tests each invalid value is rejected with its parameter name
    // Verified by removing the duplication check
    #[test]
    fn test_validate_rejects_bad_values() {
        let cases = [
            ("dup", MosaicConfig { dup: 0.0, ..MosaicConfig::default() }),
            ("dup", MosaicConfig { dup: f64::NAN, ..MosaicConfig::default() }),
            ("lower_thresh", MosaicConfig { salient: true, lower_thresh: 1.5, ..MosaicConfig::default() }),
            ("lower_thresh", MosaicConfig { salient: true, lower_thresh: 0.0, ..MosaicConfig::default() }),
            ("lower_thresh", MosaicConfig { salient: true, lower_thresh: 1.0, ..MosaicConfig::default() }),
            ("lower_thresh", MosaicConfig { salient: true, lower_thresh: f32::NAN, ..MosaicConfig::default() }),
            ("mem_limit", MosaicConfig { mem_limit_mib: 0, ..MosaicConfig::default() }),
            (
                "max_width",
                MosaicConfig {
                    unfair: Some(UnfairConfig { max_width: 0, ..UnfairConfig::default() }),
                    ..MosaicConfig::default()
                },
            ),
            (
                "freq_mul",
                MosaicConfig {
                    unfair: Some(UnfairConfig { freq_mul: -0.1, ..UnfairConfig::default() }),
                    ..MosaicConfig::default()
                },
            ),
        ];
        for (name, config) in cases {
            let Err(MosaicError::InvalidParameter { parameter, .. }) = config.validate() else {
                panic!("{name} was accepted");
            };
            assert_eq!(parameter, name);
        }
    }

    // Tests the saliency threshold is only checked for salient runs
    // Verified by checking the threshold unconditionally
    #[test]
    fn test_lower_thresh_ignored_without_saliency() {
        let idle = MosaicConfig { lower_thresh: 0.0, ..MosaicConfig::default() };
        assert!(idle.validate().is_ok());
        let inside = MosaicConfig { salient: true, lower_thresh: 0.01, ..MosaicConfig::default() };
        assert!(inside.validate().is_ok());
    }

    #[test]
    fn test_fractional_dup_is_valid() {
        let config = MosaicConfig { dup: 0.5, ..MosaicConfig::default() };
        assert!(config.validate().is_ok());
    }

    // Tests the memory ceiling is split among workers
    #[test]
    fn test_limit_bytes_divides_among_workers() {
        let config = MosaicConfig { mem_limit_mib: 100, ..MosaicConfig::default() };
        assert_eq!(config.limit_bytes(1), 100 * MIB);
        assert_eq!(config.limit_bytes(4), 25 * MIB);
        assert_eq!(config.limit_bytes(0), 100 * MIB);
    }
}
