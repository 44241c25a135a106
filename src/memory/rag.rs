//! 检索上下文（RAG）
//!
//! 每个索引由两份 JSON 组成：`vectors_<name>.json`（向量数组）与 `faiss_<name>_corpus.json`（对应文本）。
//! 查询向量与索引向量按余弦相似度排序，取前 top_k 条文本以空行拼接，注入人格提示词的 [Retrieved Context]。

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::core::AgentError;
use crate::llm::EmbeddingProvider;
use crate::text;

/// 单个检索索引：vectors[i] 对应 corpus[i]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievalIndex {
    pub vectors: Vec<Vec<f32>>,
    pub corpus: Vec<String>,
}

impl RetrievalIndex {
    pub fn len(&self) -> usize {
        self.vectors.len().min(self.corpus.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn vectors_path(dir: &Path, name: &str) -> PathBuf {
        dir.join(format!("vectors_{}.json", name))
    }

    pub fn corpus_path(dir: &Path, name: &str) -> PathBuf {
        dir.join(format!("faiss_{}_corpus.json", name))
    }

    /// 从目录读取索引；任一文件缺失或解析失败返回错误
    pub fn try_load(dir: &Path, name: &str) -> Result<Self, AgentError> {
        let read = |p: PathBuf| {
            std::fs::read_to_string(&p)
                .map_err(|e| AgentError::IndexIo(format!("{}: {}", p.display(), e)))
        };
        let vectors: Vec<Vec<f32>> = serde_json::from_str(&read(Self::vectors_path(dir, name))?)
            .map_err(|e| AgentError::IndexIo(e.to_string()))?;
        let corpus: Vec<String> = serde_json::from_str(&read(Self::corpus_path(dir, name))?)
            .map_err(|e| AgentError::IndexIo(e.to_string()))?;
        if vectors.len() != corpus.len() {
            tracing::warn!(
                index = name,
                vectors = vectors.len(),
                corpus = corpus.len(),
                "index vectors and corpus differ in length"
            );
        }
        Ok(Self { vectors, corpus })
    }

    /// 读取失败时返回空索引并告警
    pub fn load(dir: &Path, name: &str) -> Self {
        match Self::try_load(dir, name) {
            Ok(index) => {
                tracing::info!(index = name, entries = index.len(), "retrieval index loaded");
                index
            }
            Err(e) => {
                tracing::warn!(index = name, "retrieval index unavailable, skipping: {}", e);
                Self::default()
            }
        }
    }

    /// 写回两份 JSON，目录不存在时创建
    pub fn save(&self, dir: &Path, name: &str) -> Result<(), AgentError> {
        let io = |e: std::io::Error| AgentError::IndexIo(e.to_string());
        let ser = |e: serde_json::Error| AgentError::IndexIo(e.to_string());
        std::fs::create_dir_all(dir).map_err(io)?;
        std::fs::write(
            Self::vectors_path(dir, name),
            serde_json::to_string(&self.vectors).map_err(ser)?,
        )
        .map_err(io)?;
        std::fs::write(
            Self::corpus_path(dir, name),
            serde_json::to_string(&self.corpus).map_err(ser)?,
        )
        .map_err(io)
    }
}

/// 检索器：持有嵌入客户端与按名缓存的索引（首次使用时从 index_dir 加载）
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    index_dir: PathBuf,
    top_k: usize,
    max_query_chars: usize,
    indexes: RwLock<HashMap<String, Arc<RetrievalIndex>>>,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index_dir: impl Into<PathBuf>,
        top_k: usize,
        max_query_chars: usize,
    ) -> Self {
        Self {
            embedder,
            index_dir: index_dir.into(),
            top_k,
            max_query_chars,
            indexes: RwLock::new(HashMap::new()),
        }
    }

    /// 直接注册一个内存索引（覆盖同名）
    pub fn insert_index(&self, name: &str, index: RetrievalIndex) {
        self.indexes
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string(), Arc::new(index));
    }

    /// 取索引；未缓存时从磁盘加载（缺失则缓存空索引，避免重复读盘）
    pub fn index(&self, name: &str) -> Arc<RetrievalIndex> {
        if let Some(idx) = self
            .indexes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
        {
            return Arc::clone(idx);
        }
        let loaded = Arc::new(RetrievalIndex::load(&self.index_dir, name));
        self.indexes
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(name.to_string())
            .or_insert(loaded)
            .clone()
    }

    /// 检索与 query 最相似的 top_k 条文本，空行分隔
    ///
    /// 查询为空、索引为空或嵌入失败时返回空串。
    pub async fn retrieve(&self, index_name: &str, query: &str) -> String {
        let query = text::normalize(query);
        if query.is_empty() {
            return String::new();
        }
        let index = self.index(index_name);
        if index.is_empty() {
            return String::new();
        }

        // 清洗后只剩 ASCII，可按字节截断
        let query = &query[..query.len().min(self.max_query_chars)];
        let query_vec = match self.embedder.embed(query).await {
            Ok(v) if !v.is_empty() => v,
            Ok(_) => return String::new(),
            Err(e) => {
                tracing::warn!(index = index_name, "query embedding failed: {}", e);
                return String::new();
            }
        };

        top_k_similar(&index, &query_vec, self.top_k).join("\n\n")
    }

    /// 文档切块、逐块嵌入后注册为 name 索引；返回索引条数
    pub async fn index_documents(
        &self,
        name: &str,
        docs: &[String],
        max_chars: usize,
        overlap: usize,
    ) -> Result<usize, AgentError> {
        let mut index = RetrievalIndex::default();
        for doc in docs {
            for piece in text::chunk(doc, max_chars, overlap)? {
                let vector = self.embedder.embed(&piece).await?;
                if vector.is_empty() {
                    continue;
                }
                index.vectors.push(vector);
                index.corpus.push(piece);
            }
        }
        let count = index.len();
        tracing::info!(index = name, chunks = count, "documents indexed");
        self.insert_index(name, index);
        Ok(count)
    }

    /// 将内存中的索引写到 index_dir
    pub fn persist(&self, name: &str) -> Result<(), AgentError> {
        self.index(name).save(&self.index_dir, name)
    }
}

/// 按余弦相似度降序取前 k 条文本
fn top_k_similar(index: &RetrievalIndex, query: &[f32], k: usize) -> Vec<String> {
    let mut scored: Vec<(f32, usize)> = index
        .vectors
        .iter()
        .take(index.len())
        .enumerate()
        .map(|(i, v)| (cosine_similarity(query, v), i))
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored
        .into_iter()
        .take(k)
        .map(|(_, i)| index.corpus[i].clone())
        .collect()
}

/// 余弦相似度
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockEmbedder;
    use tempfile::TempDir;

    #[test]
    fn test_cosine_similarity() {
        let a = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &[1.0, 0.0, 0.0]) - 1.0).abs() < 0.001);
        assert!(cosine_similarity(&a, &[0.0, 1.0, 0.0]).abs() < 0.001);
        assert_eq!(cosine_similarity(&a, &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_top_k_orders_by_similarity() {
        let index = RetrievalIndex {
            vectors: vec![vec![0.0, 1.0], vec![1.0, 0.0], vec![0.7, 0.7]],
            corpus: vec!["far".into(), "exact".into(), "near".into()],
        };
        assert_eq!(top_k_similar(&index, &[1.0, 0.0], 2), vec!["exact", "near"]);
    }

    #[test]
    fn test_missing_files_load_empty() {
        let dir = TempDir::new().unwrap();
        assert!(RetrievalIndex::load(dir.path(), "empathy_agent").is_empty());
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let index = RetrievalIndex {
            vectors: vec![vec![0.5, 0.5]],
            corpus: vec!["hello".into()],
        };
        index.save(dir.path(), "counsel_agent").unwrap();
        assert!(dir.path().join("vectors_counsel_agent.json").exists());
        assert!(dir.path().join("faiss_counsel_agent_corpus.json").exists());
        assert_eq!(RetrievalIndex::load(dir.path(), "counsel_agent"), index);
    }

    #[tokio::test]
    async fn test_index_documents_then_retrieve() {
        let dir = TempDir::new().unwrap();
        let retriever = Retriever::new(Arc::new(MockEmbedder), dir.path(), 1, 4000);
        let docs = vec![
            "zzz zzz zzz".to_string(),
            "breathing slowly helps when anxious".to_string(),
        ];
        let n = retriever.index_documents("empathy_agent", &docs, 1000, 100).await.unwrap();
        assert_eq!(n, 2);

        let ctx = retriever
            .retrieve("empathy_agent", "I feel anxious, breathing is hard")
            .await;
        assert_eq!(ctx, "breathing slowly helps when anxious");
        assert_eq!(retriever.retrieve("empathy_agent", "   ").await, "");
        assert_eq!(retriever.retrieve("no_such_index", "hello").await, "");
    }

    #[tokio::test]
    async fn test_index_documents_rejects_bad_window() {
        let dir = TempDir::new().unwrap();
        let retriever = Retriever::new(Arc::new(MockEmbedder), dir.path(), 3, 4000);
        let err = retriever
            .index_documents("x", &["text".to_string()], 10, 10)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::InvalidArgument(_)));
    }
}
