/// Progress goes to stderr so stdout carries only the report.
pub fn progress(line: impl std::fmt::Display) {
    eprintln!("{line}");
}
