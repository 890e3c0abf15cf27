use thiserror::Error;
use todo_store::{StoreError, TodoStore};

pub const GET_ALL_TODOS: &str = "getAllTodos";
pub const CREATE_TODO: &str = "createTodo";
pub const SEARCH_TODO: &str = "searchTodo";
pub const DELETE_TODO_BY_ID: &str = "deleteTodoById";

/// Every call the model is allowed to make against the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCall {
    GetAllTodos,
    CreateTodo(String),
    SearchTodo(String),
    DeleteTodoById(i64),
}

impl ToolCall {
    pub fn name(&self) -> &'static str {
        match self {
            Self::GetAllTodos => GET_ALL_TODOS,
            Self::CreateTodo(_) => CREATE_TODO,
            Self::SearchTodo(_) => SEARCH_TODO,
            Self::DeleteTodoById(_) => DELETE_TODO_BY_ID,
        }
    }

    /// Turns a model-supplied `function`/`input` pair into a typed call.
    pub fn parse(function: &str, input: &str) -> Result<Self, ToolError> {
        match function.trim() {
            GET_ALL_TODOS => Ok(Self::GetAllTodos),
            CREATE_TODO => Ok(Self::CreateTodo(input.to_string())),
            SEARCH_TODO => Ok(Self::SearchTodo(input.to_string())),
            DELETE_TODO_BY_ID => {
                let id = input
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| ToolError::InvalidInput {
                        tool: DELETE_TODO_BY_ID,
                        reason: format!("expected an integer id, got {input:?}"),
                    })?;
                Ok(Self::DeleteTodoById(id))
            }
            other => Err(ToolError::UnknownTool {
                name: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("unknown tool '{name}'")]
    UnknownTool { name: String },
    #[error("invalid input for {tool}: {reason}")]
    InvalidInput { tool: &'static str, reason: String },
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("failed to encode tool output: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ToolError {
    /// Mistakes the model can fix by issuing a different call.
    pub fn is_correctable(&self) -> bool {
        match self {
            Self::UnknownTool { .. } | Self::InvalidInput { .. } => true,
            Self::Store(err) => err.is_validation(),
            Self::Encode(_) => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub signature: &'static str,
    pub description: &'static str,
}

impl ToolDescriptor {
    pub const fn new(
        name: &'static str,
        signature: &'static str,
        description: &'static str,
    ) -> Self {
        Self {
            name,
            signature,
            description,
        }
    }
}

#[derive(Debug)]
pub struct ToolRegistry {
    tools: Vec<ToolDescriptor>,
}

impl ToolRegistry {
    pub fn with_defaults() -> Self {
        let tools = vec![
            ToolDescriptor::new(
                GET_ALL_TODOS,
                "getAllTodos()",
                "Returns every todo in the database as a JSON array.",
            ),
            ToolDescriptor::new(
                CREATE_TODO,
                "createTodo(todo: string)",
                "Creates a new todo with the given text and returns its id.",
            ),
            ToolDescriptor::new(
                SEARCH_TODO,
                "searchTodo(query: string)",
                "Returns the todos whose text contains the query, ignoring case.",
            ),
            ToolDescriptor::new(
                DELETE_TODO_BY_ID,
                "deleteTodoById(id: string)",
                "Deletes the todo with the given numeric id.",
            ),
        ];
        Self { tools }
    }

    pub fn list(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn get(&self, name: &str) -> Option<&ToolDescriptor> {
        self.tools.iter().find(|tool| tool.name == name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tools.iter().map(|tool| tool.name).collect()
    }
}

pub struct ToolExecutor;

impl ToolExecutor {
    /// Runs one call and renders the observation text handed back to the model.
    pub fn execute(call: &ToolCall, store: &TodoStore) -> Result<String, ToolError> {
        let output = match call {
            ToolCall::GetAllTodos => serde_json::to_string(&store.list_all()?)?,
            ToolCall::CreateTodo(text) => store.create(text)?.to_string(),
            ToolCall::SearchTodo(query) => serde_json::to_string(&store.search(query)?)?,
            ToolCall::DeleteTodoById(id) => {
                if store.delete_by_id(*id)? {
                    format!("deleted todo {id}")
                } else {
                    format!("no todo with id {id}")
                }
            }
        };
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn parses_every_registered_name() {
        let registry = ToolRegistry::with_defaults();
        for name in registry.names() {
            let input = if name == DELETE_TODO_BY_ID { "1" } else { "x" };
            let call = ToolCall::parse(name, input).expect("registered tool parses");
            assert_eq!(call.name(), name);
        }
        assert_eq!(registry.list().len(), 4);
        assert!(registry.get(SEARCH_TODO).is_some());
        assert!(registry.get("updateTodo").is_none());
    }

    #[test]
    fn unknown_tool_is_a_correctable_error() {
        let err = ToolCall::parse("dropAllTodos", "").expect_err("unknown");
        assert!(matches!(err, ToolError::UnknownTool { ref name } if name == "dropAllTodos"));
        assert!(err.is_correctable());
    }

    #[test]
    fn delete_requires_integer_id() {
        assert_eq!(
            ToolCall::parse(DELETE_TODO_BY_ID, " 42 ").expect("id"),
            ToolCall::DeleteTodoById(42)
        );
        let err = ToolCall::parse(DELETE_TODO_BY_ID, "milk").expect_err("not an id");
        assert!(matches!(err, ToolError::InvalidInput { .. }));
    }

    #[test]
    fn executes_calls_against_the_store() {
        let store = TodoStore::open_in_memory().expect("store");

        let id = ToolExecutor::execute(&ToolCall::CreateTodo("Buy milk".into()), &store)
            .expect("create");
        assert_eq!(id, "1");

        let listed = ToolExecutor::execute(&ToolCall::GetAllTodos, &store).expect("list");
        let value: Value = serde_json::from_str(&listed).expect("json array");
        assert_eq!(value[0]["id"], 1);
        assert_eq!(value[0]["todo"], "Buy milk");

        let found = ToolExecutor::execute(&ToolCall::SearchTodo("MILK".into()), &store)
            .expect("search");
        assert!(found.contains("Buy milk"));

        let deleted =
            ToolExecutor::execute(&ToolCall::DeleteTodoById(1), &store).expect("delete");
        assert_eq!(deleted, "deleted todo 1");
        let again = ToolExecutor::execute(&ToolCall::DeleteTodoById(1), &store).expect("noop");
        assert_eq!(again, "no todo with id 1");
    }

    #[test]
    fn empty_create_surfaces_validation_error() {
        let store = TodoStore::open_in_memory().expect("store");
        let err = ToolExecutor::execute(&ToolCall::CreateTodo(String::new()), &store)
            .expect_err("empty todo");
        assert!(matches!(err, ToolError::Store(StoreError::EmptyTodo)));
        assert!(err.is_correctable());
    }
}
