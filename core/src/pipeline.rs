use crate::context::build_context;
use crate::corpus::Corpora;
use crate::error::RankingFailure;
use crate::oracle::{Completion, RankingClient};
use crate::scheduler::{RunOutcome, Scheduler};
use crate::{Category, Question, RankingResult};
use std::sync::Arc;

/// Everything a ranking task needs, handed to each task explicitly.
pub struct Retrieval<C> {
    corpora: Arc<Corpora>,
    client: Arc<RankingClient<C>>,
}

impl<C> Clone for Retrieval<C> {
    fn clone(&self) -> Self { Self { corpora: self.corpora.clone(), client: self.client.clone() } }
}

impl<C: Completion> Retrieval<C> {
    pub fn new(corpora: Arc<Corpora>, client: Arc<RankingClient<C>>) -> Self { Self { corpora, client } }

    /// Rank a single question against its candidate set.
    pub async fn answer(&self, question: &Question) -> Result<RankingResult, RankingFailure> {
        let category = Category::parse(&question.category).map_err(|cause| RankingFailure::new(question.qid, cause))?;
        let context = build_context(category, &question.source, self.corpora.for_category(category));
        tracing::debug!(qid = question.qid, %category, candidates = question.source.len(), context_chars = context.len(), "built context");

        let result = self.client.rank(question, &context).await?;
        if !question.source.contains(&result.retrieve) {
            tracing::warn!(qid = question.qid, retrieve = result.retrieve, "oracle chose a document outside the candidate set");
        }
        Ok(result)
    }

    pub async fn run(&self, questions: Vec<Question>, max_tasks: usize) -> RunOutcome {
        Scheduler::new(max_tasks)
            .run(questions, |question| {
                let retrieval = self.clone();
                async move { retrieval.answer(&question).await }
            })
            .await
    }
}
