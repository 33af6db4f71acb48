//! Tests for error types including source chaining and message formatting

#[cfg(test)]
mod tests {
    use photomosaic::MosaicError;
    use photomosaic::io::error::{backend_error, computation_error, invalid_parameter};
    use std::error::Error;
    use std::path::PathBuf;

    // Tests error source chaining works correctly
    // Verified by breaking source chain
    #[test]
    fn test_error_source_chain() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let error = MosaicError::FileSystem {
            path: "/tmp/tiles".into(),
            operation: "read directory",
            source: io_error,
        };

        assert!(error.source().is_some());
        let message = error.to_string();
        assert!(message.contains("read directory"));
        assert!(message.contains("/tmp/tiles"));
    }

    // Tests InvalidParameter error contains all fields
    // Verified by omitting value from message
    #[test]
    fn test_invalid_parameter_error() {
        let error = invalid_parameter("dup", &-1.5, &"must be positive");

        let message = error.to_string();
        assert!(message.contains("dup"));
        assert!(message.contains("-1.5"));
        assert!(message.contains("must be positive"));
        assert!(error.source().is_none());
    }

    // Tests ImageExport error with IO source
    // Verified by excluding source error from message
    #[test]
    fn test_image_export_error() {
        let image_error = image::ImageError::IoError(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "access denied",
        ));
        let error = MosaicError::ImageExport {
            path: PathBuf::from("/out/result.png"),
            source: image_error,
        };

        let message = error.to_string();
        assert!(message.contains("/out/result.png"));
        assert!(message.contains("access denied"));
        assert!(error.source().is_some());
    }

    #[test]
    fn test_solver_failure_reports_size() {
        let error = MosaicError::SolverFailure {
            size: 12,
            reason: "row 3 has no finite cost".to_string(),
        };
        let message = error.to_string();
        assert!(message.contains("12x12"));
        assert!(message.contains("row 3"));
    }

    #[test]
    fn test_helper_constructors() {
        let computation = computation_error("distance", &"shape mismatch");
        assert!(matches!(
            computation,
            MosaicError::Computation { operation: "distance", .. }
        ));
        assert!(computation.to_string().contains("shape mismatch"));

        let backend = backend_error(&"no adapter");
        assert_eq!(backend.to_string(), "Backend error: no adapter");
    }

    // Tests conversions from foreign errors keep their source
    #[test]
    fn test_from_conversions() {
        let io: MosaicError = std::io::Error::other("disk gone").into();
        assert!(matches!(io, MosaicError::FileSystem { .. }));
        assert!(io.source().is_some());

        let image: MosaicError =
            image::ImageError::IoError(std::io::Error::other("truncated")).into();
        assert!(matches!(image, MosaicError::ImageLoad { .. }));
        assert!(image.to_string().contains("truncated"));
    }
}
