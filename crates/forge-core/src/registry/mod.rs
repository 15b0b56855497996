//! ComponentRegistry - コンポーネントの分類表
//!
//! kind ごとに「ホストで宣言済み」と「パッチにしか存在しない」の 2 集合を持ちます。
//! インターセプション層はこの表だけを見てリダイレクトの可否を決めます。
//!
//! # ライフサイクル
//! - プロセスごとに 1 回だけ `init()` し、以降は読み取り専用
//! - `clear()` はテスト用
//!
//! # 優先順位
//! - 存在判定はホスト優先（両方にある名前はホスト宣言扱いで、決してリダイレクトしない）
//! - launch mode はパッチ優先

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use crate::artifact::bundle;
use crate::domain::{
    ComponentDecl, ComponentKind, ComponentRecord, FilterRule, HostManifest, LaunchMode,
    PatchManifest,
};

#[derive(Debug, Default)]
struct KindIndex {
    host: HashSet<String>,
    patch_only: HashSet<String>,
}

#[derive(Debug, Default)]
struct RegistryIndex {
    kinds: HashMap<ComponentKind, KindIndex>,
    records: HashMap<(ComponentKind, String), ComponentRecord>,
    launch_modes: HashMap<String, LaunchMode>,
    /// action -> rules, highest priority first.
    filters: HashMap<String, Vec<FilterRule>>,
    application: Option<String>,
}

impl RegistryIndex {
    fn build(host: &HostManifest, patch: Option<&PatchManifest>) -> Self {
        let mut index = RegistryIndex::default();

        for decl in &host.components {
            index.kind_mut(decl.kind).host.insert(decl.name.clone());
            if let Some(mode) = decl.launch_mode {
                index.launch_modes.insert(decl.name.clone(), mode);
            }
            index.records.insert(
                (decl.kind, decl.name.clone()),
                record_from(decl, true, Vec::new()),
            );
        }

        let Some(patch) = patch else {
            return index;
        };
        index.application = patch.application.clone();

        for decl in &patch.components {
            if let Some(mode) = decl.launch_mode {
                index.launch_modes.insert(decl.name.clone(), mode);
            }
            if index.kind(decl.kind).is_some_and(|k| k.host.contains(&decl.name)) {
                debug!(kind = %decl.kind, name = %decl.name, "patch component shadowed by host declaration");
                continue;
            }
            if decl.kind == ComponentKind::Provider && decl.authority.is_none() {
                warn!(name = %decl.name, "patch provider without authority ignored");
                continue;
            }

            let rules: Vec<FilterRule> = if decl.kind == ComponentKind::Listener {
                decl.filters
                    .iter()
                    .map(|f| FilterRule {
                        action: f.action.clone(),
                        priority: f.priority,
                        component: decl.name.clone(),
                    })
                    .collect()
            } else {
                Vec::new()
            };
            for rule in &rules {
                index
                    .filters
                    .entry(rule.action.clone())
                    .or_default()
                    .push(rule.clone());
            }

            index.kind_mut(decl.kind).patch_only.insert(decl.name.clone());
            index
                .records
                .insert((decl.kind, decl.name.clone()), record_from(decl, false, rules));
        }

        for rules in index.filters.values_mut() {
            // Stable: equal priorities keep manifest order.
            rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        }
        index
    }

    fn kind(&self, kind: ComponentKind) -> Option<&KindIndex> {
        self.kinds.get(&kind)
    }

    fn kind_mut(&mut self, kind: ComponentKind) -> &mut KindIndex {
        self.kinds.entry(kind).or_default()
    }
}

fn record_from(decl: &ComponentDecl, declared_in_host: bool, filters: Vec<FilterRule>) -> ComponentRecord {
    ComponentRecord {
        kind: decl.kind,
        qualified_name: decl.name.clone(),
        declared_in_host,
        launch_mode: decl.launch_mode,
        authority: decl.authority.clone(),
        filters,
    }
}

/// ComponentRegistry はホスト宣言とパッチ専用のコンポーネントを索引化
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    index: RwLock<RegistryIndex>,
    initialized: AtomicBool,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// ホストの記述子とパッチ artifact のマニフェストから索引を作る
    ///
    /// パッチ側の読み込みに失敗した場合はログを出し、「パッチのコンポーネントなし」
    /// として続行します。2 回目以降の呼び出しは何もしません。
    pub fn init(&self, host: &HostManifest, patch_artifact: Option<&Path>) {
        let patch = patch_artifact.and_then(|path| match bundle::read_manifest(path) {
            Ok(manifest) => Some(manifest),
            Err(e) => {
                warn!(
                    artifact = %path.display(),
                    error = %e,
                    "patch manifest unreadable; continuing without patch components"
                );
                None
            }
        });
        self.init_with(host, patch.as_ref());
    }

    /// パース済みのマニフェストから索引を作る
    pub fn init_with(&self, host: &HostManifest, patch: Option<&PatchManifest>) {
        if self.initialized.swap(true, Ordering::AcqRel) {
            debug!("component registry already initialized");
            return;
        }
        let index = RegistryIndex::build(host, patch);
        let patch_only: usize = index.kinds.values().map(|k| k.patch_only.len()).sum();
        info!(
            host_components = host.components.len(),
            patch_only,
            "component registry initialized"
        );
        *self.index.write() = index;
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn is_declared_in_host(&self, kind: ComponentKind, name: &str) -> bool {
        self.index
            .read()
            .kind(kind)
            .is_some_and(|k| k.host.contains(name))
    }

    pub fn is_patch_only(&self, kind: ComponentKind, name: &str) -> bool {
        self.index
            .read()
            .kind(kind)
            .is_some_and(|k| k.patch_only.contains(name))
    }

    /// Declared in host OR patch-only.
    pub fn exists(&self, kind: ComponentKind, name: &str) -> bool {
        self.index
            .read()
            .kind(kind)
            .is_some_and(|k| k.host.contains(name) || k.patch_only.contains(name))
    }

    /// Patch value wins when both manifests declare a mode; unknown names are `Standard`.
    pub fn launch_mode_of(&self, name: &str) -> LaunchMode {
        self.index
            .read()
            .launch_modes
            .get(name)
            .copied()
            .unwrap_or_default()
    }

    /// Patch-only listener filters for `action`, highest priority first.
    pub fn filters_for(&self, action: &str) -> Vec<FilterRule> {
        self.index
            .read()
            .filters
            .get(action)
            .cloned()
            .unwrap_or_default()
    }

    pub fn record(&self, kind: ComponentKind, name: &str) -> Option<ComponentRecord> {
        self.index
            .read()
            .records
            .get(&(kind, name.to_string()))
            .cloned()
    }

    /// Patch-only providers, sorted by name.
    pub fn patch_providers(&self) -> Vec<ComponentRecord> {
        let index = self.index.read();
        let mut providers: Vec<ComponentRecord> = index
            .records
            .values()
            .filter(|r| r.kind == ComponentKind::Provider && !r.declared_in_host)
            .cloned()
            .collect();
        providers.sort_by(|a, b| a.qualified_name.cmp(&b.qualified_name));
        providers
    }

    /// Application delegate named by the patch manifest.
    pub fn application(&self) -> Option<String> {
        self.index.read().application.clone()
    }

    /// Drop the index so `init` can run again (tests only).
    pub fn clear(&self) {
        *self.index.write() = RegistryIndex::default();
        self.initialized.store(false, Ordering::Release);
    }
}
