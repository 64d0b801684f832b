//! Stored procedure wrappers
//!
//! Each procedure yields one [`ProcedureDecl`] holding everything the static
//! class, the interface and the delegating object need. Data-returning
//! procedures with a captured sample additionally get typed result wrappers.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, trace};

use crate::error::DalgenError;
use crate::params::GenerationParameters;
use crate::sanitize::Sanitizer;
use crate::schema::{to_pascal_case, Parameter, ResultTable, SampleResult, StoredProcedure};
use crate::typemap::{RuntimeType, TypeMap};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamDecl {
    pub name: String,
    pub code_name: String,
    pub code_type: String,
    pub is_out: bool,
    /// e.g. `out int total` or `int? id`
    pub declaration: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultPropertyDecl {
    pub column_name: String,
    pub member_name: String,
    pub member_type: String,
    /// Assignment executed by `FillFromDataRow`
    pub fill_statement: String,
}

/// Typed wrapper for one result table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultWrapperDecl {
    pub index: usize,
    pub class_name: String,
    pub base_class: String,
    pub properties: Vec<ResultPropertyDecl>,
}

/// Aggregate of all result tables returned by a procedure
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataObjectDecl {
    pub class_name: String,
    /// Class name qualified with the static class holding it
    pub qualified_name: String,
    pub autotrim: bool,
    /// `autotrim` as a C# literal
    pub autotrim_literal: String,
    pub tables: Vec<ResultWrapperDecl>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcedureDecl {
    pub name: String,
    pub method_name: String,
    pub returns_data: bool,
    pub return_type: String,
    /// Catalog order
    pub params: Vec<ParamDecl>,
    /// Parameter list for interface and object methods
    pub signature: String,
    /// Parameter list continuation after `IDataProviderSp sp_provider` in static methods
    pub static_params: String,
    /// Argument list continuation after the provider when delegating
    pub forward_args: String,
    /// Command creation and parameter binding
    pub command: Vec<String>,
    /// Copies output parameter values back after execution
    pub copy_out: Vec<String>,
    pub data_object: Option<DataObjectDecl>,
}

/// Builds [`ProcedureDecl`]s from catalog procedures
pub struct ProcedureEmitter<'a> {
    params: &'a GenerationParameters,
    type_map: &'a TypeMap,
    sanitizer: &'a Sanitizer,
}

impl<'a> ProcedureEmitter<'a> {
    pub fn new(params: &'a GenerationParameters, type_map: &'a TypeMap, sanitizer: &'a Sanitizer) -> Self {
        Self {
            params,
            type_map,
            sanitizer,
        }
    }

    pub fn build(&self, procedure: &StoredProcedure) -> Result<ProcedureDecl, DalgenError> {
        let params = procedure
            .parameters
            .iter()
            .map(|p| self.param(procedure, p))
            .collect::<Result<Vec<_>, _>>()?;

        let signature = params
            .iter()
            .map(|p| p.declaration.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let static_params: String = params
            .iter()
            .map(|p| format!(",\n            {}", p.declaration))
            .collect();
        let forward_args: String = params
            .iter()
            .map(|p| {
                if p.is_out {
                    format!(", out {}", p.code_name)
                } else {
                    format!(", {}", p.code_name)
                }
            })
            .collect();

        let mut command = vec![
            format!("var {} = {}.CreateCommand();", LOCAL_COMMAND, LOCAL_PROVIDER),
            format!(
                "{0}.CommandText = {1}.DatabasePrefix + {1}.SchemaPrefix + \".{2}\";",
                LOCAL_COMMAND,
                LOCAL_PROVIDER,
                procedure.name
            ),
            format!("{}.CommandType = CommandType.StoredProcedure;", LOCAL_COMMAND),
        ];
        let mut copy_out = Vec::new();
        for (param, decl) in procedure.parameters.iter().zip(&params) {
            if decl.is_out {
                let local = format!("{}par_{}", LOCAL_PREFIX, decl.code_name);
                command.push(format!(
                    "var {0} = AddParameterOut({1}, \"@{2}\", DbType.{3}, DBNull.Value, {4}, {5}, {6});",
                    local,
                    LOCAL_COMMAND,
                    param.name,
                    param.param_type,
                    precision_hint(param),
                    scale_hint(param),
                    size_hint(param)
                ));
                copy_out.push(format!(
                    "{0} = {1}.Value == DBNull.Value ? default({2}) : ({2}) {1}.Value;",
                    decl.code_name, local, decl.code_type
                ));
            } else {
                command.push(format!(
                    "AddParameter({}, \"@{}\", DbType.{}, (CheckNull({3}) ? (object) DBNull.Value : (object) {3}));",
                    LOCAL_COMMAND, param.name, param.param_type, decl.code_name
                ));
            }
        }

        let data_object = match (&procedure.sample, procedure.returns_data) {
            (Some(sample), true) => Some(self.data_object(procedure, sample)?),
            _ => None,
        };
        if procedure.returns_data && data_object.is_none() {
            debug!(procedure = ?procedure.name, "No sample result, skipping data object");
        }

        Ok(ProcedureDecl {
            name: procedure.name.clone(),
            method_name: self.method_name(&procedure.name),
            returns_data: procedure.returns_data,
            return_type: if procedure.returns_data { "DataTable" } else { "int" }.to_string(),
            params,
            signature,
            static_params,
            forward_args,
            command,
            copy_out,
            data_object,
        })
    }

    pub fn method_name(&self, procedure: &str) -> String {
        self.sanitizer
            .identifier(&format!("{}{}", self.params.sp_prefix, procedure))
    }

    fn param(&self, procedure: &StoredProcedure, param: &Parameter) -> Result<ParamDecl, DalgenError> {
        let is_out = param.is_out();
        let code_type = self
            .type_map
            .resolve_param(param.param_type, is_out)
            .map_err(|e| match e {
                DalgenError::UnmappedType { db_type, .. } => DalgenError::UnmappedType {
                    db_type,
                    context: format!("{} @{}", procedure.name, param.name),
                },
                other => other,
            })?;
        let code_name = clear_of_locals(&param.code_name);
        let declaration = if is_out {
            format!("out {} {}", code_type, code_name)
        } else {
            format!("{} {}", code_type, code_name)
        };
        Ok(ParamDecl {
            name: param.name.clone(),
            code_name,
            code_type,
            is_out,
            declaration,
        })
    }

    fn data_object(&self, procedure: &StoredProcedure, sample: &SampleResult) -> Result<DataObjectDecl, DalgenError> {
        let class_name = format!("{}{}", self.params.class_prefix, to_pascal_case(&procedure.name));
        let tables = sample
            .tables
            .iter()
            .enumerate()
            .map(|(index, table)| self.result_wrapper(&class_name, index, table))
            .collect::<Result<Vec<_>, _>>()?;

        debug!(procedure = ?procedure.name, tables = tables.len(), "Building data object");

        Ok(DataObjectDecl {
            qualified_name: format!("{}.{}", self.params.sp_class_name, class_name),
            class_name,
            autotrim: self.params.sp_data_wrapper_autotrim,
            autotrim_literal: csharp_bool(self.params.sp_data_wrapper_autotrim).to_string(),
            tables,
        })
    }

    fn result_wrapper(&self, parent: &str, index: usize, table: &ResultTable) -> Result<ResultWrapperDecl, DalgenError> {
        let mut properties = Vec::with_capacity(table.columns.len());
        let mut members = MemberNames::default();
        for (column_name, column) in result_column_names(table).into_iter().zip(&table.columns) {
            let folded = if self.params.make_names_lowercase {
                column_name.to_lowercase()
            } else {
                column_name.clone()
            };
            let member_name = members.claim(
                self.sanitizer
                    .identifier(&format!("{}{}", self.params.member_prefix, folded)),
            );
            let member_type = self.type_map.resolve_runtime(column.runtime_type)?;
            trace!(column = ?column_name, member = ?member_name, "Result column");

            properties.push(ResultPropertyDecl {
                fill_statement: fill_statement(&member_name, &column_name, &member_type, column.runtime_type),
                column_name,
                member_name,
                member_type,
            });
        }

        Ok(ResultWrapperDecl {
            index,
            class_name: format!("{}_{}", parent, index),
            base_class: self
                .params
                .base_class_for_tables
                .clone()
                .unwrap_or_else(|| "object".to_string()),
            properties,
        })
    }
}

/// Every local the generated method bodies declare starts with this
pub const LOCAL_PREFIX: &str = "sp_";
pub const LOCAL_PROVIDER: &str = "sp_provider";
pub const LOCAL_COMMAND: &str = "sp_cmd";

/// Parameter names that would shadow a generated local get an underscore
fn clear_of_locals(code_name: &str) -> String {
    if code_name.starts_with(LOCAL_PREFIX) {
        format!("_{}", code_name)
    } else {
        code_name.to_string()
    }
}

pub fn csharp_bool(value: bool) -> &'static str {
    if value {
        "true"
    } else {
        "false"
    }
}

/// Member names already used by one wrapper class
#[derive(Debug, Default)]
struct MemberNames {
    used: HashMap<String, usize>,
}

impl MemberNames {
    /// Returns `name`, or `name` with the first free numeric suffix
    fn claim(&mut self, name: String) -> String {
        let mut candidate = name.clone();
        let mut suffix = self.used.get(&name).copied().unwrap_or(0);
        while self.used.contains_key(&candidate) {
            suffix += 1;
            candidate = format!("{}{}", name, suffix);
        }
        self.used.insert(name, suffix);
        self.used.entry(candidate.clone()).or_insert(0);
        candidate
    }
}

fn precision_hint(param: &Parameter) -> String {
    if param.precision > 0 && matches!(param.sql_type.as_str(), "decimal" | "numeric") {
        param.precision.to_string()
    } else {
        "null".to_string()
    }
}

fn scale_hint(param: &Parameter) -> String {
    if param.precision > 0 && matches!(param.sql_type.as_str(), "decimal" | "numeric") {
        param.scale.to_string()
    } else {
        "null".to_string()
    }
}

fn size_hint(param: &Parameter) -> String {
    if param.size > 0 {
        param.size.to_string()
    } else {
        "null".to_string()
    }
}

/// Column names as a filled `DataTable` reports them
///
/// Unnamed columns become `Column1`, `Column2`, ...; repeated names get a
/// numeric suffix starting at 1.
pub fn result_column_names(table: &ResultTable) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let mut unnamed = 0;
    let mut names = Vec::with_capacity(table.columns.len());

    for column in &table.columns {
        let base = if column.name.trim().is_empty() {
            unnamed += 1;
            format!("Column{}", unnamed)
        } else {
            column.name.clone()
        };

        let count = seen.entry(base.to_lowercase()).or_insert(0);
        let name = if *count == 0 {
            base
        } else {
            format!("{}{}", base, count)
        };
        *count += 1;
        names.push(name);
    }
    names
}

/// `FillFromDataRow` assignment for one column
pub fn fill_statement(member: &str, column: &str, member_type: &str, runtime_type: RuntimeType) -> String {
    let value = format!("r[\"{}\"]", column);
    let conversion = match runtime_type {
        RuntimeType::Int32 => format!("Convert.ToInt32({})", value),
        RuntimeType::Int16 => format!("Convert.ToInt16({})", value),
        RuntimeType::Int64 => format!("Convert.ToInt64({})", value),
        RuntimeType::UInt32 => format!("Convert.ToUInt32({})", value),
        RuntimeType::Byte => format!("Convert.ToByte({})", value),
        RuntimeType::Boolean => format!("Convert.ToBoolean({})", value),
        RuntimeType::DateTime => format!("Convert.ToDateTime({})", value),
        RuntimeType::Single => format!("Convert.ToSingle({})", value),
        RuntimeType::Double => format!("Convert.ToDouble({})", value),
        RuntimeType::Decimal => format!("Convert.ToDecimal({})", value),
        RuntimeType::String => format!(
            "(autotrim ? Convert.ToString({0}).Trim() : Convert.ToString({0}))",
            value
        ),
        RuntimeType::DateTimeOffset => format!("(DateTimeOffset) {}", value),
        RuntimeType::TimeSpan => format!("(TimeSpan) {}", value),
        RuntimeType::Guid => format!("(Guid) {}", value),
        RuntimeType::Binary => format!("(byte[]) {}", value),
        RuntimeType::Object => value,
    };
    format!(
        "this.{} = r.IsNull(\"{}\") ? ({}) null : {};",
        member, column, member_type, conversion
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ParamDirection, RawParameter, ResultColumn};
    use crate::typemap::ParamType;

    fn param(name: &str, sql_type: &str, direction: ParamDirection) -> Parameter {
        let raw = RawParameter {
            name: format!("@{}", name),
            sql_type: sql_type.to_string(),
            direction,
            precision: 0,
            scale: 0,
            size: 0,
        };
        Parameter::from_raw(raw, &Sanitizer::new()).unwrap().unwrap()
    }

    fn column(name: &str, runtime_type: RuntimeType) -> ResultColumn {
        ResultColumn {
            name: name.to_string(),
            runtime_type,
        }
    }

    fn build(params: &GenerationParameters, procedure: &StoredProcedure) -> ProcedureDecl {
        let type_map = TypeMap::sql_server();
        let sanitizer = Sanitizer::new();
        ProcedureEmitter::new(params, &type_map, &sanitizer)
            .build(procedure)
            .unwrap()
    }

    fn overlaps() -> StoredProcedure {
        let mut procedure = StoredProcedure::new("grp_getoverlaps", false);
        procedure.parameters = vec![
            param("id_room", "int", ParamDirection::In),
            param("d1", "datetime", ParamDirection::In),
            param("d2", "datetime", ParamDirection::In),
            param("class", "varchar", ParamDirection::In),
            param("active", "bit", ParamDirection::In),
        ];
        procedure
    }

    #[test]
    fn test_row_count_wrapper() {
        let decl = build(&GenerationParameters::default(), &overlaps());

        assert_eq!(decl.return_type, "int");
        assert!(!decl.returns_data);
        assert!(decl.data_object.is_none());
        assert!(decl.copy_out.is_empty());

        let names: Vec<_> = decl.params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["id_room", "d1", "d2", "class", "active"]);
        assert_eq!(
            decl.signature,
            "int? id_room, DateTime? d1, DateTime? d2, string _class, bool? active"
        );
        assert_eq!(decl.forward_args, ", id_room, d1, d2, _class, active");
        assert_eq!(decl.command.len(), 3 + 5);
        assert_eq!(
            decl.command[6],
            "AddParameter(sp_cmd, \"@class\", DbType.AnsiString, (CheckNull(_class) ? (object) DBNull.Value : (object) _class));"
        );
    }

    #[test]
    fn test_output_parameters() {
        let mut procedure = StoredProcedure::new("gsp_book", false);
        procedure.parameters = vec![
            param("id_room", "int", ParamDirection::In),
            param("id_booking", "int", ParamDirection::InOut),
        ];
        let decl = build(&GenerationParameters::default(), &procedure);

        assert_eq!(decl.signature, "int? id_room, out int id_booking");
        assert_eq!(decl.static_params, ",\n            int? id_room,\n            out int id_booking");
        assert_eq!(decl.forward_args, ", id_room, out id_booking");
        assert_eq!(
            decl.command[4],
            "var sp_par_id_booking = AddParameterOut(sp_cmd, \"@id_booking\", DbType.Int32, DBNull.Value, null, null, null);"
        );
        assert_eq!(
            decl.copy_out,
            vec!["id_booking = sp_par_id_booking.Value == DBNull.Value ? default(int) : (int) sp_par_id_booking.Value;"]
        );
    }

    #[test]
    fn test_data_object() {
        let mut procedure = StoredProcedure::new("grp_getlatest", true);
        procedure.sample = Some(SampleResult {
            tables: vec![
                ResultTable {
                    columns: vec![column("ID", RuntimeType::Int32), column("Name", RuntimeType::String)],
                    row_count: 3,
                },
                ResultTable {
                    columns: vec![column("total", RuntimeType::Decimal)],
                    row_count: 1,
                },
            ],
        });
        let decl = build(&GenerationParameters::default(), &procedure);

        assert_eq!(decl.return_type, "DataTable");
        let data_object = decl.data_object.unwrap();
        assert_eq!(data_object.class_name, "TableGrpGetlatest");
        assert_eq!(data_object.qualified_name, "StoredProcedures.TableGrpGetlatest");
        assert_eq!(data_object.tables.len(), 2);
        assert_eq!(data_object.tables[0].class_name, "TableGrpGetlatest_0");
        assert_eq!(data_object.tables[1].class_name, "TableGrpGetlatest_1");

        let id = &data_object.tables[0].properties[0];
        assert_eq!(id.member_name, "id");
        assert_eq!(data_object.autotrim_literal, "false");
        assert_eq!(id.member_type, "int?");
        assert_eq!(
            id.fill_statement,
            "this.id = r.IsNull(\"ID\") ? (int?) null : Convert.ToInt32(r[\"ID\"]);"
        );
    }

    #[test]
    fn test_autotrim_literal() {
        let mut procedure = StoredProcedure::new("grp_names", true);
        procedure.sample = Some(SampleResult {
            tables: vec![ResultTable {
                columns: vec![column("name", RuntimeType::String)],
                row_count: 1,
            }],
        });
        let params = GenerationParameters {
            sp_data_wrapper_autotrim: true,
            ..Default::default()
        };
        let data_object = build(&params, &procedure).data_object.unwrap();
        assert!(data_object.autotrim);
        assert_eq!(data_object.autotrim_literal, "true");
    }

    #[test]
    fn test_wrapper_member_names_are_unique() {
        let mut procedure = StoredProcedure::new("grp_pairs", true);
        procedure.sample = Some(SampleResult {
            tables: vec![ResultTable {
                columns: vec![
                    column("a b", RuntimeType::Int32),
                    column("a_b", RuntimeType::Int32),
                    column("a-b", RuntimeType::Int32),
                    column("a_b1", RuntimeType::Int32),
                ],
                row_count: 1,
            }],
        });
        let data_object = build(&GenerationParameters::default(), &procedure).data_object.unwrap();
        let properties = &data_object.tables[0].properties;

        let members: Vec<_> = properties.iter().map(|p| p.member_name.as_str()).collect();
        assert_eq!(members, vec!["a_b", "a_b1", "a_b2", "a_b11"]);
        let columns: Vec<_> = properties.iter().map(|p| p.column_name.as_str()).collect();
        assert_eq!(columns, vec!["a b", "a_b", "a-b", "a_b1"]);
        assert_eq!(
            properties[1].fill_statement,
            "this.a_b1 = r.IsNull(\"a_b\") ? (int?) null : Convert.ToInt32(r[\"a_b\"]);"
        );
    }

    #[test]
    fn test_parameters_do_not_shadow_locals() {
        let mut procedure = StoredProcedure::new("gsp_total", false);
        procedure.parameters = vec![
            param("result", "int", ParamDirection::InOut),
            param("sp_cmd", "int", ParamDirection::In),
        ];
        let decl = build(&GenerationParameters::default(), &procedure);

        assert_eq!(decl.signature, "out int result, int? _sp_cmd");
        assert_eq!(
            decl.command[3],
            "var sp_par_result = AddParameterOut(sp_cmd, \"@result\", DbType.Int32, DBNull.Value, null, null, null);"
        );
        assert_eq!(
            decl.command[4],
            "AddParameter(sp_cmd, \"@sp_cmd\", DbType.Int32, (CheckNull(_sp_cmd) ? (object) DBNull.Value : (object) _sp_cmd));"
        );
        assert_eq!(
            decl.copy_out,
            vec!["result = sp_par_result.Value == DBNull.Value ? default(int) : (int) sp_par_result.Value;"]
        );
    }

    #[test]
    fn test_returns_data_without_sample() {
        let procedure = StoredProcedure::new("grp_getlatest", true);
        let decl = build(&GenerationParameters::default(), &procedure);
        assert_eq!(decl.return_type, "DataTable");
        assert!(decl.data_object.is_none());
    }

    #[test]
    fn test_method_name_prefix() {
        let params = GenerationParameters {
            sp_prefix: "Sp_".to_string(),
            ..Default::default()
        };
        let decl = build(&params, &overlaps());
        assert_eq!(decl.method_name, "Sp_grp_getoverlaps");
        assert_eq!(
            decl.command[1],
            "sp_cmd.CommandText = sp_provider.DatabasePrefix + sp_provider.SchemaPrefix + \".grp_getoverlaps\";"
        );
    }

    #[test]
    fn test_result_column_names() {
        let table = ResultTable {
            columns: vec![
                column("id", RuntimeType::Int32),
                column("", RuntimeType::Int32),
                column("id", RuntimeType::Int32),
                column("", RuntimeType::String),
            ],
            row_count: 0,
        };
        assert_eq!(result_column_names(&table), vec!["id", "Column1", "id1", "Column2"]);
    }

    #[test]
    fn test_fill_statement_string() {
        assert_eq!(
            fill_statement("name", "name", "string", RuntimeType::String),
            "this.name = r.IsNull(\"name\") ? (string) null : (autotrim ? Convert.ToString(r[\"name\"]).Trim() : Convert.ToString(r[\"name\"]));"
        );
    }

    #[test]
    fn test_param_type_override() {
        let type_map = TypeMap::sql_server().with_param(ParamType::Xml, "XElement", "XElement");
        let mut procedure = StoredProcedure::new("gsp_x", false);
        procedure.parameters = vec![param("doc", "xml", ParamDirection::In)];
        let sanitizer = Sanitizer::new();
        let params = GenerationParameters::default();
        let decl = ProcedureEmitter::new(&params, &type_map, &sanitizer)
            .build(&procedure)
            .unwrap();
        assert_eq!(decl.signature, "XElement doc");
    }
}
