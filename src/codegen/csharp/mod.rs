//! C# code generator
//!
//! Generates a single C# source file with table and view wrappers, stored
//! procedure wrappers and the infrastructure classes they rely on.

pub mod clips;
pub mod entity;
pub mod procedure;
pub mod registry;
pub mod statements;

use minijinja::Environment;
use tracing::{debug, info, warn};

use crate::codegen::CodeGenerator;
use crate::error::DalgenError;
use crate::params::GenerationParameters;
use crate::sanitize::Sanitizer;
use crate::schema::{to_pascal_case, Schema, StoredProcedure, Table};
use crate::typemap::TypeMap;

pub use clips::Clips;
pub use entity::{EntityDecl, EntityEmitter};
pub use procedure::{ProcedureDecl, ProcedureEmitter};
pub use registry::{EntityRegistry, RegisteredEntity};

/// C# code generator
pub struct CSharpGenerator {
    env: Environment<'static>,
    params: GenerationParameters,
    type_map: TypeMap,
    sanitizer: Sanitizer,
    clips: Clips,
}

impl CSharpGenerator {
    pub fn new(params: GenerationParameters) -> Self {
        let mut env = Environment::new();
        env.set_trim_blocks(true);
        env.set_lstrip_blocks(true);

        // Register templates
        env.add_template("entity", include_str!("templates/entity.cs.jinja"))
            .expect("Failed to load entity template");
        env.add_template("procedures", include_str!("templates/procedures.cs.jinja"))
            .expect("Failed to load procedures template");
        env.add_template("context", include_str!("templates/context.cs.jinja"))
            .expect("Failed to load context template");
        env.add_template("mappings", include_str!("templates/mappings.cs.jinja"))
            .expect("Failed to load mappings template");

        Self {
            env,
            params,
            type_map: TypeMap::sql_server(),
            sanitizer: Sanitizer::new(),
            clips: Clips::builtin(),
        }
    }

    /// Generator using the clip overrides named in the parameters, if any
    pub fn from_params(params: GenerationParameters) -> Result<Self, DalgenError> {
        let clips = match &params.clips_dir {
            Some(dir) => Clips::load_dir(dir)?,
            None => Clips::builtin(),
        };
        Ok(Self::new(params).with_clips(clips))
    }

    pub fn with_type_map(mut self, type_map: TypeMap) -> Self {
        self.type_map = type_map;
        self
    }

    pub fn with_clips(mut self, clips: Clips) -> Self {
        self.clips = clips;
        self
    }

    pub fn params(&self) -> &GenerationParameters {
        &self.params
    }

    fn entity_emitter(&self) -> EntityEmitter<'_> {
        EntityEmitter::new(&self.params, &self.type_map, &self.sanitizer)
    }

    /// Render the wrapper class for one table or view
    ///
    /// Excluded tables render as an empty string.
    pub fn emit_entity(&self, table: &Table) -> Result<String, DalgenError> {
        match self.entity_emitter().build(table)? {
            Some(decl) => self.render_entity(&decl),
            None => Ok(String::new()),
        }
    }

    /// Render the stored procedure section: static class, interface and object wrapper
    pub fn emit_procedures(&self, procedures: &[StoredProcedure]) -> Result<String, DalgenError> {
        let emitter = ProcedureEmitter::new(&self.params, &self.type_map, &self.sanitizer);
        let mut decls = Vec::with_capacity(procedures.len());
        for procedure in procedures {
            if let Some(load_error) = &procedure.load_error {
                warn!(procedure = ?procedure.name, error = %load_error, "Emitting partially loaded procedure");
            }
            let decl = emitter.build(procedure)?;
            debug!(procedure = ?decl.name, params = decl.params.len(), data_object = decl.data_object.is_some(), "Procedure wrapper");
            decls.push(decl);
        }

        let class_name = &self.params.sp_class_name;
        let ctx = minijinja::context! {
            class_name => class_name,
            interface_name => format!("I{}", class_name),
            obj_name => format!("{}Obj", class_name),
            check_nullable => self.clips.check_nullable.trim_end(),
            has_wrappers => decls.iter().any(|d| d.data_object.is_some()),
            procedures => decls,
        };
        self.render("procedures", class_name, ctx)
    }

    fn render_entity(&self, decl: &EntityDecl) -> Result<String, DalgenError> {
        self.render("entity", &decl.table_name, minijinja::context! { e => decl })
    }

    fn render(&self, name: &str, object: &str, ctx: minijinja::Value) -> Result<String, DalgenError> {
        let template = self.env.get_template(name).map_err(|e| DalgenError::CodeGen {
            object: object.to_string(),
            message: format!("Template error: {}", e),
        })?;

        template.render(ctx).map_err(|e| DalgenError::CodeGen {
            object: object.to_string(),
            message: format!("Render error: {}", e),
        })
    }

    /// Emit one region of entity wrappers, recording each in the registry
    fn emit_region(
        &self,
        title: &str,
        tables: &[Table],
        registry: &mut EntityRegistry,
    ) -> Result<String, DalgenError> {
        let emitter = self.entity_emitter();
        let mut parts = vec![format!("    #region {}", title)];
        for table in tables {
            let Some(decl) = emitter.build(table)? else {
                continue;
            };
            parts.push(self.render_entity(&decl)?);
            let property_name = self.sanitizer.identifier(&to_pascal_case(&decl.table_name));
            registry.register(RegisteredEntity::from_decl(&decl, property_name));
        }
        parts.push("    #endregion".to_string());
        Ok(parts.join("\n\n"))
    }

    fn header(&self) -> String {
        let mut header = self.clips.namespaces.trim_end().to_string();
        header.push('\n');
        for namespace in &self.params.additional_namespaces {
            let namespace = namespace.trim_start_matches("using ").trim_end_matches(';').trim();
            header.push_str(&format!("using {};\n", namespace));
        }
        header
    }
}

impl CodeGenerator for CSharpGenerator {
    fn generate(&self, schema: &Schema) -> Result<String, DalgenError> {
        info!(
            namespace = ?self.params.code_namespace,
            tables = schema.tables.len(),
            views = schema.views.len(),
            procedures = schema.procedures.len(),
            "Generating C# code"
        );

        let mut registry = EntityRegistry::new();
        let mut sections: Vec<String> = Vec::new();

        if let Some(code) = &self.params.namespace_start_code {
            sections.push(code.trim_end().to_string());
        }
        if !self.params.dont_inject_infrastructure_classes {
            sections.push(
                self.clips
                    .attributes_block(self.params.generate_query_object)
                    .trim_end()
                    .to_string(),
            );
        }
        if !self.params.dont_inject_basic_sql_provider {
            sections.push(self.clips.basic_provider.trim_end().to_string());
        }
        if self.params.generate_query_object {
            sections.push(self.clips.query_obj.trim_end().to_string());
        }

        sections.push(self.emit_region("database tables", &schema.tables, &mut registry)?);
        sections.push(self.emit_region("database views", &schema.views, &mut registry)?);
        debug!(entities = registry.len(), "Entities emitted");

        if self.params.use_sps {
            sections.push(self.emit_procedures(&schema.procedures)?);
        }

        let rows = registry.mapping_rows();
        if !self.params.dont_inject_infrastructure_classes && !rows.is_empty() {
            sections.push(self.render("mappings", "DalMappings", minijinja::context! { rows => rows })?);
        }

        if !self.params.dont_inject_linq_helpers {
            let entities: Vec<&RegisteredEntity> = registry.iter().collect();
            let ctx = minijinja::context! {
                entities => entities,
                catalog_schema => &self.params.catalog_schema,
            };
            sections.push(self.render("context", "DbContext", ctx)?);
        }

        let mut code = self.header();
        code.push('\n');
        code.push_str(&format!("namespace {} {{\n\n", self.params.code_namespace));
        code.push_str(&sections.join("\n\n"));
        code.push_str("\n}\n");

        info!(entities = registry.len(), bytes = code.len(), "C# code generation complete");
        Ok(code)
    }
}
