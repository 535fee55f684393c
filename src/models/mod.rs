pub mod quiz;
pub mod table;

pub use quiz::{
    AnalysisOp, Answer, ExtractedQuestion, FileFormat, ProcessedDataset, QuestionPayload,
    QuizTask, RetrievedFile, SubmissionOutcome, TaskBrief, Verdict,
};
pub use table::DataTable;
