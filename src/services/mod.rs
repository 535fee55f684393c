pub mod answer_submitter;
pub mod arithmetic;
pub mod data_processor;
pub mod file_retriever;
pub mod llm_service;
pub mod question_extractor;

pub use answer_submitter::AnswerSubmitter;
pub use data_processor::DataProcessor;
pub use file_retriever::FileRetriever;
pub use llm_service::LlmService;
pub use question_extractor::QuestionExtractor;
