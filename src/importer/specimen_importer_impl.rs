// ==========================================
// 标本导入系统 - 标本导入器实现
// ==========================================
// 职责: 整合导入流程，从文本/文件到数据库
// 流程: 读取研究上下文 → 加载 → 列名解析 → 校验 → 提交
// ==========================================
// 加载与持久化错误立即终止；校验错误在整轮（可能被截断的）扫描后统一返回，
// 校验失败时提交器不会被调用
// ==========================================

use crate::config::StudyContextProvider;
use crate::domain::specimen::{ImportRequest, ImportSummary, RawRow};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::field_mapper::FieldMapper;
use crate::importer::file_parser::{LoaderOptions, TabLoader, UniversalFileParser};
use crate::importer::import_committer::{CommitContext, ImportCommitter};
use crate::importer::specimen_importer_trait::{
    FieldMapper as _, FileParser, RowValidator, SpecimenImporter, TabularLoader,
};
use crate::importer::specimen_validator::SpecimenValidator;
use crate::repository::SpecimenStore;
use async_trait::async_trait;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// 导入数据来源
enum Source<'a> {
    Text(&'a str),
    File(&'a Path),
}

// ==========================================
// SpecimenImporterImpl - 标本导入器实现
// ==========================================
pub struct SpecimenImporterImpl<S, C>
where
    S: SpecimenStore,
    C: StudyContextProvider,
{
    // 持久化端口
    store: S,

    // 研究上下文读取器
    config: C,

    // 导入组件
    loader: Box<dyn TabularLoader>,
    file_parser: Box<dyn FileParser>,
    validator: Box<dyn RowValidator>,
    committer: ImportCommitter,
}

impl<S, C> SpecimenImporterImpl<S, C>
where
    S: SpecimenStore,
    C: StudyContextProvider,
{
    /// 使用默认组件创建
    pub fn new(store: S, config: C) -> Self {
        Self::with_components(
            store,
            config,
            Box::new(TabLoader),
            Box::new(UniversalFileParser),
            Box::new(SpecimenValidator::new()),
        )
    }

    /// 注入自定义组件创建
    ///
    /// # 参数
    /// - store: 持久化端口
    /// - config: 研究上下文读取器
    /// - loader: 文本加载器
    /// - file_parser: 文件解析器
    /// - validator: 行校验器
    pub fn with_components(
        store: S,
        config: C,
        loader: Box<dyn TabularLoader>,
        file_parser: Box<dyn FileParser>,
        validator: Box<dyn RowValidator>,
    ) -> Self {
        Self {
            store,
            config,
            loader,
            file_parser,
            validator,
            committer: ImportCommitter,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &C {
        &self.config
    }

    async fn run(&self, source: Source<'_>, request: &ImportRequest) -> ImportResult<ImportSummary> {
        let started = Instant::now();
        let batch_id = Uuid::new_v4().to_string();

        // === 步骤 0: 研究上下文 ===
        let ctx = self.config.load_context().await?;
        info!(
            batch_id = %batch_id,
            container = %ctx.container_id,
            timepoint = %ctx.timepoint_type,
            mode = %request.mode,
            "开始导入标本数据"
        );

        let mapper = FieldMapper::for_subject_noun(&ctx.subject_noun);
        let mut options = mapper
            .type_hints(LoaderOptions::default())
            .with_strict(ctx.strict_type_conversion);
        options.infer_rows = ctx.type_inference_rows;

        // === 步骤 1: 加载 ===
        debug!("步骤 1: 加载");
        let raw_rows = self.load(source, &options).map_err(|e| {
            error!(batch_id = %batch_id, error = %e, "加载失败");
            e
        })?;
        info!(rows = raw_rows.len(), "加载完成");

        // === 步骤 2: 列名解析 ===
        debug!("步骤 2: 列名解析");
        let (rows, labels) = mapper.resolve_rows(raw_rows);

        // === 步骤 3: 校验 ===
        debug!("步骤 3: 校验");
        let validated = self
            .validator
            .validate(rows, labels, ctx.timepoint_type)
            .map_err(|errors| {
                warn!(batch_id = %batch_id, errors = errors.len(), "校验未通过");
                ImportError::Validation(errors)
            })?;

        // === 步骤 4: 提交 ===
        debug!("步骤 4: 提交");
        let commit_ctx = CommitContext {
            batch_id: batch_id.clone(),
            container_id: ctx.container_id.clone(),
            actor: request.actor.clone(),
            mode: request.mode,
            started,
        };
        let summary = self.committer.commit(&self.store, &validated, &commit_ctx)?;

        info!(
            batch_id = %batch_id,
            rows = summary.rows,
            participants = summary.participants,
            specimens = summary.specimens,
            vials = summary.vials,
            elapsed_ms = summary.elapsed_ms,
            "标本数据导入完成"
        );

        Ok(summary)
    }

    fn load(&self, source: Source<'_>, options: &LoaderOptions) -> ImportResult<Vec<RawRow>> {
        match source {
            Source::Text(text) => self.loader.load(text, options),
            Source::File(path) => self.file_parser.parse_file(path, options),
        }
    }
}

#[async_trait]
impl<S, C> SpecimenImporter for SpecimenImporterImpl<S, C>
where
    S: SpecimenStore,
    C: StudyContextProvider,
{
    #[instrument(skip(self, text, request), fields(actor = %request.actor))]
    async fn import_text(
        &self,
        text: &str,
        request: &ImportRequest,
    ) -> ImportResult<ImportSummary> {
        self.run(Source::Text(text), request).await
    }

    #[instrument(skip(self, request), fields(actor = %request.actor))]
    async fn import_file(
        &self,
        file_path: &Path,
        request: &ImportRequest,
    ) -> ImportResult<ImportSummary> {
        self.run(Source::File(file_path), request).await
    }

    /// 批量导入多个文本（并发执行）
    async fn batch_import(
        &self,
        documents: Vec<String>,
        request: &ImportRequest,
    ) -> Vec<ImportResult<ImportSummary>> {
        use futures::future::join_all;

        info!(count = documents.len(), "开始批量导入");

        let import_tasks = documents.iter().enumerate().map(|(idx, text)| async move {
            let result = self.import_text(text, request).await;
            if let Err(e) = &result {
                error!(document = idx + 1, error = %e, "文档导入失败");
            }
            result
        });

        // 并发执行所有导入任务
        let results = join_all(import_tasks).await;

        info!(
            total = results.len(),
            success = results.iter().filter(|r| r.is_ok()).count(),
            failed = results.iter().filter(|r| r.is_err()).count(),
            "批量导入完成"
        );

        results
    }
}
