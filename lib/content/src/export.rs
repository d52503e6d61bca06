//! CSV export of a quiz.
//!
//! The layout is the one quiz platforms import: one question per row, up to
//! four choices, and the correct answer as a letter when it is one of them.

use crate::schema::QuizResult;

/// File name offered for downloads.
pub const EXPORT_FILE_NAME: &str = "quiz_export.csv";

/// Content type of the exported file.
pub const EXPORT_CONTENT_TYPE: &str = "text/csv; charset=utf-8";

/// Column names, in order.
const HEADER: [&str; 6] = [
    "question", "choice_a", "choice_b", "choice_c", "choice_d", "correct",
];

/// Byte-order mark so spreadsheet tools pick UTF-8 for accented text.
const UTF8_BOM: char = '\u{feff}';

const CHOICE_COLUMNS: usize = 4;

/// Renders a quiz as CSV.
///
/// The output starts with a UTF-8 byte-order mark, then an unquoted header
/// row, then one fully quoted row per question in quiz order. Rows are
/// separated by `\n`.
#[must_use]
pub fn to_csv(quiz: &QuizResult) -> String {
    let mut rows = Vec::with_capacity(quiz.questions.len() + 1);
    rows.push(HEADER.join(","));

    for question in &quiz.questions {
        let mut fields = Vec::with_capacity(HEADER.len());
        fields.push(quote(&question.prompt));
        fields.extend(
            (0..CHOICE_COLUMNS).map(|i| quote(question.options.get(i).map_or("", String::as_str))),
        );

        let correct = match question.correct_option_index() {
            Some(index) => option_letter(index),
            None => question.correct_answer.clone(),
        };
        fields.push(quote(&correct));

        rows.push(fields.join(","));
    }

    let mut out = String::new();
    out.push(UTF8_BOM);
    out.push_str(&rows.join("\n"));
    out
}

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

/// `0 -> A`, `1 -> B`, ...
fn option_letter(index: usize) -> String {
    u8::try_from(index)
        .ok()
        .and_then(|i| b'A'.checked_add(i))
        .map(|b| char::from(b).to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Question;

    fn rows(csv: &str) -> Vec<&str> {
        csv.trim_start_matches(UTF8_BOM).split('\n').collect()
    }

    #[test]
    fn starts_with_utf8_bom_and_header() {
        let csv = to_csv(&QuizResult::new(vec![]));
        assert_eq!(&csv.as_bytes()[..3], &[0xEF, 0xBB, 0xBF]);
        assert_eq!(
            rows(&csv),
            vec!["question,choice_a,choice_b,choice_c,choice_d,correct"]
        );
    }

    #[test]
    fn multiple_choice_answer_becomes_letter() {
        let quiz = QuizResult::new(vec![Question::new(
            "2+2?",
            vec!["3".into(), "4".into(), "5".into(), "6".into()],
            "4",
        )]);
        assert_eq!(rows(&to_csv(&quiz))[1], r#""2+2?","3","4","5","6","B""#);
    }

    #[test]
    fn short_answer_keeps_answer_text() {
        let quiz = QuizResult::new(vec![Question::new("Capital of France?", vec![], "Paris")]);
        assert_eq!(
            rows(&to_csv(&quiz))[1],
            r#""Capital of France?","","","","","Paris""#
        );
    }

    #[test]
    fn true_false_pads_missing_choices() {
        let quiz = QuizResult::new(vec![Question::new(
            "La Terre est plate.",
            vec!["Vrai".into(), "Faux".into()],
            " faux",
        )]);
        assert_eq!(
            rows(&to_csv(&quiz))[1],
            r#""La Terre est plate.","Vrai","Faux","","","B""#
        );
    }

    #[test]
    fn quotes_are_doubled() {
        let quiz = QuizResult::new(vec![Question::new(
            r#"Qui a dit "je pense donc je suis" ?"#,
            vec![],
            r#"René "Descartes""#,
        )]);
        assert_eq!(
            rows(&to_csv(&quiz))[1],
            r#""Qui a dit ""je pense donc je suis"" ?","","","","","René ""Descartes""""#
        );
    }

    #[test]
    fn rows_follow_quiz_order() {
        let quiz = QuizResult::new(vec![
            Question::new("Premier", vec![], "1"),
            Question::new("Second", vec![], "2"),
        ]);
        let csv = to_csv(&quiz);
        let rows = rows(&csv);
        assert_eq!(rows.len(), 3);
        assert!(rows[1].starts_with("\"Premier\""));
        assert!(rows[2].starts_with("\"Second\""));
    }

    #[test]
    fn extra_options_are_dropped() {
        let quiz = QuizResult::new(vec![Question::new(
            "Lettre ?",
            vec!["a", "b", "c", "d", "e"]
                .into_iter()
                .map(String::from)
                .collect(),
            "e",
        )]);
        assert_eq!(
            rows(&to_csv(&quiz))[1],
            r#""Lettre ?","a","b","c","d","E""#
        );
    }
}
