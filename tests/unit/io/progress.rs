//! Tests for stage progress reporting

#[cfg(test)]
mod tests {
    use photomosaic::io::progress::{NoProgress, ProgressReporter, ProgressSink};

    // Tests a stage counts advances until it finishes
    // Verified by dropping the increment
    #[test]
    fn test_reporter_tracks_active_stage() {
        let reporter = ProgressReporter::hidden();
        assert_eq!(reporter.position(), None);

        reporter.start("Computing distances", 10);
        reporter.advance(3);
        reporter.advance(4);
        assert_eq!(reporter.position(), Some(7));

        reporter.finish();
        assert_eq!(reporter.position(), None);
    }

    // Tests a new stage replaces the previous one
    #[test]
    fn test_reporter_restarts_on_new_stage() {
        let reporter = ProgressReporter::hidden();
        reporter.start("Reading tiles", 5);
        reporter.advance(5);
        reporter.start("Aligning tiles", 0);
        assert_eq!(reporter.position(), Some(0));
        reporter.advance(2);
        assert_eq!(reporter.position(), Some(2));
        reporter.finish();
    }

    #[test]
    fn test_advance_without_stage_is_ignored() {
        let reporter = ProgressReporter::hidden();
        reporter.advance(1);
        reporter.finish();
        assert_eq!(reporter.position(), None);
    }

    // Tests both sinks are usable behind the trait object
    #[test]
    fn test_sinks_as_trait_objects() {
        let sinks: [Box<dyn ProgressSink>; 2] = [Box::new(NoProgress), Box::new(ProgressReporter::hidden())];
        for sink in &sinks {
            sink.start("Composing", 2);
            sink.advance(2);
            sink.finish();
        }
    }
}
