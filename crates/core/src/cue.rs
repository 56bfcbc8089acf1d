/// Returns `true` if an assistant reply reads like the end of the lesson.
///
/// The reply must both thank the learner and mention that the work is
/// done. Matching is case-insensitive.
pub fn is_wrap_up(content: &str) -> bool {
    const THANKS: [&str; 2] = ["thank you", "thanks for"];
    const DONE: [&str; 3] = ["completed", "finished", "great job"];

    let content = content.to_lowercase();
    THANKS.iter().any(|cue| content.contains(cue))
        && DONE.iter().any(|cue| content.contains(cue))
}
